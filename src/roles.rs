use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Admin,
    Staff,
    Student,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Role {
        match raw.trim().to_ascii_lowercase().as_str() {
            "teacher" | "pengajar" => Role::Teacher,
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            "student" | "santri" => Role::Student,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Student => "student",
            Role::Other(s) => s.as_str(),
        }
    }

    pub fn is_admin_or_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

/// The caller of a guarded operation. Always passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorWire {
    user_id: String,
    role: String,
}

impl Actor {
    pub fn new(user_id: &str, role: Role) -> Self {
        Actor {
            user_id: user_id.to_string(),
            role,
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Option<Actor> {
        let wire: ActorWire = serde_json::from_value(v.clone()).ok()?;
        if wire.user_id.trim().is_empty() {
            return None;
        }
        Some(Actor::new(wire.user_id.trim(), Role::parse(&wire.role)))
    }

    /// Teacher role and named as the schedule's teacher.
    pub fn is_teacher_of_record(&self, teacher_id: &str) -> bool {
        self.role == Role::Teacher && self.user_id == teacher_id
    }
}
