use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Account role. Teachers own a class; students belong to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => bail!("unknown user type: {}", other),
        }
    }
}

/// A stored account row. The password hash never leaves this type; responses
/// carry a [`SessionUser`] instead.
#[derive(Debug, Clone)]
pub struct User {
    id: i64,
    username: String,
    password_hash: String,
    full_name: String,
    email: Option<String>,
    role: Role,
    class_name: String,
    created_at: NaiveDateTime,
}

impl User {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        username: String,
        password_hash: String,
        full_name: String,
        email: Option<String>,
        role: Role,
        class_name: String,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            username,
            password_hash,
            full_name,
            email,
            role,
            class_name,
            created_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn set_password_hash(&mut self, hash: String) {
        self.password_hash = hash;
    }

    /// The client-held session record persisted after login.
    pub fn session(&self) -> SessionUser {
        SessionUser {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            user_type: self.role,
            class_name: self.class_name.clone(),
        }
    }
}

/// Fields for inserting a new account; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub class_name: String,
}

/// The identity record carried by the client between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub user_type: Role,
    pub class_name: String,
}
