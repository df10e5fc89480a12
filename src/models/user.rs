//! Roles de usuario
//!
//! La identidad la emite el servicio externo; aquí solo se distingue el rol
//! que viaja en los claims del JWT para autorizar cada operación.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Driver,
}

impl UserRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(UserRole::Student),
            "driver" => Some(UserRole::Driver),
            _ => None,
        }
    }
}
