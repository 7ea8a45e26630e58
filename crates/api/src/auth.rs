//! JWT access tokens and the authenticated-caller extractor.
//!
//! Access tokens are HS256-signed JWTs carrying a [`Claims`] payload. The
//! platform's account service issues them; this subsystem only validates.
//! Event-level privileges are not a token role: hosts are recognized by
//! ownership (`event.host_id`), admins by the `admin` role claim.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use plenum_core::error::CoreError;
use plenum_core::event::Event;
use plenum_core::types::ParticipantId;

use crate::error::AppError;
use crate::state::AppState;

/// Platform operators; may manage any event.
pub const ROLE_ADMIN: &str = "admin";
/// Ordinary attendees.
pub const ROLE_PARTICIPANT: &str = "participant";

/// JWT claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the participant's id.
    pub sub: ParticipantId,
    /// Role name (`"admin"` or `"participant"`).
    pub role: String,
    /// Expiry, seconds since the epoch (UTC).
    pub exp: i64,
    /// Issued-at, seconds since the epoch (UTC).
    pub iat: i64,
    /// Token id (UUID v4), for audit trails.
    pub jti: String,
}

/// Configuration for JWT validation and (test) token generation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Signing secret shared with the platform's account service.
    pub secret: String,
    /// Access token lifetime in minutes (default: 60).
    pub access_token_expiry_mins: i64,
}

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 60;

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `JWT_SECRET`             | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS` | no       | `60`    |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let access_token_expiry_mins: i64 = std::env::var("JWT_ACCESS_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_ACCESS_EXPIRY_MINS must be a valid i64");

        Self {
            secret,
            access_token_expiry_mins,
        }
    }
}

/// Generate an HS256 access token for the given participant.
pub fn generate_access_token(
    participant_id: ParticipantId,
    role: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let exp = now + config.access_token_expiry_mins * 60;

    let claims = Claims {
        sub: participant_id,
        role: role.to_string(),
        exp,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate and decode an access token, returning the embedded [`Claims`].
///
/// Signature and expiry are checked by the default validation.
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Authenticated caller extracted from a JWT Bearer token in the
/// `Authorization` header.
///
/// Use as an extractor parameter in any handler that requires
/// authentication:
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(participant_id = %user.participant_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The caller's participant id (from `claims.sub`).
    pub participant_id: ParticipantId,
    /// The caller's role name (`"admin"` or `"participant"`).
    pub role: String,
}

impl AuthUser {
    /// Whether the caller may manage the given event: its host, or an
    /// admin.
    pub fn can_manage(&self, event: &Event) -> bool {
        self.role == ROLE_ADMIN || event.host_id == self.participant_id
    }

    /// [`Self::can_manage`] as a guard, for handlers that reject
    /// non-managers outright.
    pub fn require_manage(&self, event: &Event) -> Result<(), AppError> {
        if self.can_manage(event) {
            Ok(())
        } else {
            Err(AppError::Core(CoreError::Forbidden(
                "Only the event host or an admin may do this".into(),
            )))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            participant_id: claims.sub,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "unit-test-signing-secret-0123456789".to_string(),
            access_token_expiry_mins: 60,
        }
    }

    #[test]
    fn generate_and_validate_access_token() {
        let config = test_config();
        let participant = ParticipantId::new();
        let token =
            generate_access_token(participant, ROLE_ADMIN, &config).expect("token should encode");

        let claims = validate_token(&token, &config).expect("token should validate");
        assert_eq!(claims.sub, participant);
        assert_eq!(claims.role, ROLE_ADMIN);
        assert!(claims.exp > claims.iat);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn expired_token_fails() {
        let config = test_config();

        // Expired well past the validator's default leeway.
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: ParticipantId::new(),
            role: ROLE_PARTICIPANT.to_string(),
            exp: now - 300,
            iat: now - 600,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .expect("token should encode");

        let result = validate_token(&token, &config);
        assert!(result.is_err(), "validation must reject an expired token");
    }

    #[test]
    fn different_secrets_fail() {
        let config_a = JwtConfig {
            secret: "event-service-secret-one".to_string(),
            access_token_expiry_mins: 60,
        };
        let config_b = JwtConfig {
            secret: "event-service-secret-two".to_string(),
            access_token_expiry_mins: 60,
        };

        let token = generate_access_token(ParticipantId::new(), ROLE_PARTICIPANT, &config_a)
            .expect("token should encode");

        let result = validate_token(&token, &config_b);
        assert!(
            result.is_err(),
            "a token from another signer must be rejected"
        );
    }

    #[test]
    fn host_and_admin_can_manage() {
        use chrono::Utc;
        use plenum_core::event::{BreakoutDefaults, EventKind, EventSettings, EventStatus};
        use plenum_core::types::EventId;

        let now = Utc::now();
        let host = ParticipantId::new();
        let event = Event {
            id: EventId::new(),
            title: "Panel".into(),
            host_id: host,
            kind: EventKind::Hosted,
            status: EventStatus::Active,
            locked: false,
            scheduled_start: now,
            duration_minutes: 60,
            waiting_room_minutes: 0,
            settings: EventSettings::default(),
            breakout_defaults: BreakoutDefaults::default(),
            created_at: now,
            updated_at: now,
        };

        let as_host = AuthUser {
            participant_id: host,
            role: ROLE_PARTICIPANT.to_string(),
        };
        let as_admin = AuthUser {
            participant_id: ParticipantId::new(),
            role: ROLE_ADMIN.to_string(),
        };
        let as_stranger = AuthUser {
            participant_id: ParticipantId::new(),
            role: ROLE_PARTICIPANT.to_string(),
        };

        assert!(as_host.can_manage(&event));
        assert!(as_admin.can_manage(&event));
        assert!(!as_stranger.can_manage(&event));
        assert!(as_stranger.require_manage(&event).is_err());
    }
}
