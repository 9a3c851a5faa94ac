//! Principal extraction from trusted identity headers.
//!
//! The upstream identity layer authenticates the caller and forwards who
//! they are as `x-user-*` headers; this server only reads them.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use domain::{Principal, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(CurrentUser)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| ApiError::BadRequest(format!("{name} is not valid text"))),
    }
}

/// Builds the principal from identity headers; `x-user-id` is mandatory.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let user_id = header(headers, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;

    let role = match header(headers, USER_ROLE_HEADER)? {
        Some(role) => role.parse::<Role>()?,
        None => Role::default(),
    };

    let mut principal = match role {
        Role::Staff => Principal::staff(user_id),
        Role::Customer => Principal::customer(user_id),
    };
    if let Some(email) = header(headers, USER_EMAIL_HEADER)? {
        principal = principal.with_email(email);
    }
    if let Some(name) = header(headers, USER_NAME_HEADER)? {
        principal = principal.with_name(name);
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_missing_user_id_is_unauthorized() {
        let err = principal_from_headers(&headers(&[(USER_EMAIL_HEADER, "a@b.c")])).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = principal_from_headers(&headers(&[(USER_ID_HEADER, "  ")])).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_defaults_to_customer() {
        let principal = principal_from_headers(&headers(&[
            (USER_ID_HEADER, "u1"),
            (USER_EMAIL_HEADER, "u1@example.com"),
            (USER_NAME_HEADER, "User One"),
        ]))
        .unwrap();
        assert_eq!(principal.user_id, "u1");
        assert_eq!(principal.role, Role::Customer);
        assert_eq!(principal.email.as_deref(), Some("u1@example.com"));
        assert_eq!(principal.name.as_deref(), Some("User One"));
    }

    #[test]
    fn test_staff_role() {
        let principal =
            principal_from_headers(&headers(&[(USER_ID_HEADER, "admin"), (USER_ROLE_HEADER, "staff")]))
                .unwrap();
        assert!(principal.is_staff());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let err =
            principal_from_headers(&headers(&[(USER_ID_HEADER, "u1"), (USER_ROLE_HEADER, "root")]))
                .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
