//! Autenticación JWT
//!
//! Los tokens los emite el servicio de identidad externo; este extractor
//! solo los verifica con el secreto compartido y expone la identidad y el
//! rol del llamador a los handlers.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use uuid::Uuid;

use crate::models::user::UserRole;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::jwt::{extract_token_from_header, verify_token};

/// Usuario autenticado que se inyecta en las requests
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthenticatedUser {
    /// Verificar que el llamador es un estudiante y devolver su id
    pub fn require_student(&self) -> Result<Uuid, AppError> {
        if self.role != UserRole::Student {
            return Err(AppError::Forbidden(
                "This endpoint is only available to students".to_string(),
            ));
        }
        Ok(self.user_id)
    }

    /// Verificar que el llamador es un conductor y devolver su id
    pub fn require_driver(&self) -> Result<Uuid, AppError> {
        if self.role != UserRole::Driver {
            return Err(AppError::Forbidden(
                "This endpoint is only available to drivers".to_string(),
            ));
        }
        Ok(self.user_id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Token de autorización requerido".to_string())
            })?;

        let token = extract_token_from_header(auth_header)?;
        let claims = verify_token(token, &state.config.jwt_secret)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("ID de usuario inválido".to_string()))?;
        let role = UserRole::parse(&claims.role)
            .ok_or_else(|| AppError::Unauthorized("Rol de usuario inválido".to_string()))?;

        Ok(AuthenticatedUser { user_id, role })
    }
}
