//! Request validation producing field-level error lists.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::auth::dto::{LoginRequest, RegisterRequest, SocialLoginRequest};
use crate::error::AppError;
use crate::social::{Provider, ProviderAllowList};

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;

pub const EMAIL_TAKEN: &str = "The email has already been taken.";

/// Field name to messages, serialized as `{"email": ["..."]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn required<'a>(errors: &mut FieldErrors, field: &str, value: &'a Option<String>) -> Option<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.add(field, format!("The {field} field is required."));
            None
        }
    }
}

fn check_email(errors: &mut FieldErrors, raw: &Option<String>) -> String {
    let Some(raw) = required(errors, "email", raw) else {
        return String::new();
    };
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        errors.add("email", "The email must be a valid email address.");
    }
    if email.chars().count() > EMAIL_MAX {
        errors.add("email", format!("The email may not be greater than {EMAIL_MAX} characters."));
    }
    email
}

fn check_password(errors: &mut FieldErrors, raw: &Option<String>) -> String {
    let Some(password) = required(errors, "password", raw) else {
        return String::new();
    };
    if password.chars().count() < PASSWORD_MIN {
        errors.add("password", format!("The password must be at least {PASSWORD_MIN} characters."));
    }
    password.to_string()
}

#[derive(Debug)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Format checks for registration; email uniqueness is added by the caller.
pub fn registration(req: &RegisterRequest) -> (Registration, FieldErrors) {
    let mut errors = FieldErrors::default();

    let name = match required(&mut errors, "name", &req.name) {
        Some(n) => {
            let n = n.trim();
            let len = n.chars().count();
            if len < NAME_MIN {
                errors.add("name", format!("The name must be at least {NAME_MIN} characters."));
            } else if len > NAME_MAX {
                errors.add("name", format!("The name may not be greater than {NAME_MAX} characters."));
            }
            n.to_string()
        }
        None => String::new(),
    };

    let email = check_email(&mut errors, &req.email);
    let password = check_password(&mut errors, &req.password);
    if !password.is_empty() && req.password_confirmation.as_deref() != Some(password.as_str()) {
        errors.add("password", "The password confirmation does not match.");
    }

    (
        Registration {
            name,
            email,
            password,
        },
        errors,
    )
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn login(req: &LoginRequest) -> Result<Credentials, AppError> {
    let mut errors = FieldErrors::default();
    let email = check_email(&mut errors, &req.email);
    let password = check_password(&mut errors, &req.password);
    errors.into_result()?;
    Ok(Credentials { email, password })
}

#[derive(Debug)]
pub struct ProviderToken {
    pub provider: Provider,
    pub access_token: String,
}

pub fn social_login(
    req: &SocialLoginRequest,
    allowed: &ProviderAllowList,
) -> Result<ProviderToken, AppError> {
    let mut errors = FieldErrors::default();

    let provider = required(&mut errors, "provider", &req.provider).and_then(|name| {
        let resolved = allowed.resolve(name);
        if resolved.is_none() {
            errors.add("provider", "The selected provider is invalid.");
        }
        resolved
    });
    let access_token = required(&mut errors, "access_token", &req.access_token).map(str::to_string);

    match (provider, access_token) {
        (Some(provider), Some(access_token)) if errors.is_empty() => Ok(ProviderToken {
            provider,
            access_token,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_req(name: &str, email: &str, pw: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            name: Some(name.into()),
            email: Some(email.into()),
            password: Some(pw.into()),
            password_confirmation: Some(confirm.into()),
        }
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("ann@x.com"));
        assert!(!is_valid_email("ann@x"));
        assert!(!is_valid_email("ann x@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn valid_registration_is_normalized() {
        let (reg, errors) = registration(&register_req(" Ann ", " Ann@X.com ", "secret1", "secret1"));
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(reg.name, "Ann");
        assert_eq!(reg.email, "ann@x.com");
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let (_, errors) = registration(&register_req("A", "nope", "123", "123"));
        assert!(errors.has("name"));
        assert!(errors.has("email"));
        assert!(errors.has("password"));
    }

    #[test]
    fn registration_requires_matching_confirmation() {
        let (_, errors) = registration(&register_req("Ann", "ann@x.com", "secret1", "secret2"));
        assert_eq!(
            errors.get("password"),
            Some(&["The password confirmation does not match.".to_string()][..])
        );
    }

    #[test]
    fn registration_limits_lengths() {
        let long_name = "n".repeat(NAME_MAX + 1);
        let long_email = format!("{}@x.com", "e".repeat(EMAIL_MAX));
        let (_, errors) = registration(&register_req(&long_name, &long_email, "secret1", "secret1"));
        assert!(errors.has("name"));
        assert!(errors.has("email"));
    }

    #[test]
    fn values_at_the_limits_are_accepted() {
        let local = "e".repeat(EMAIL_MAX - "@x.com".len());
        let email = format!("{local}@x.com");
        assert_eq!(email.len(), EMAIL_MAX);
        let password = "p".repeat(PASSWORD_MIN);

        for name in ["n".repeat(NAME_MIN), "n".repeat(NAME_MAX)] {
            let (reg, errors) = registration(&register_req(&name, &email, &password, &password));
            assert!(errors.is_empty(), "{errors:?}");
            assert_eq!(reg.name, name);
            assert_eq!(reg.email, email);
        }

        let creds = login(&LoginRequest {
            email: Some(email.clone()),
            password: Some(password.clone()),
        })
        .unwrap();
        assert_eq!(creds.password, password);
    }

    #[test]
    fn values_just_past_the_limits_are_rejected() {
        let short = "p".repeat(PASSWORD_MIN - 1);
        let (_, errors) = registration(&register_req(
            &"n".repeat(NAME_MIN - 1),
            "ann@x.com",
            &short,
            &short,
        ));
        assert!(errors.has("name"));
        assert!(errors.has("password"));
        assert!(!errors.has("email"));
    }

    #[test]
    fn missing_fields_are_required() {
        let (_, errors) = registration(&RegisterRequest::default());
        for field in ["name", "email", "password"] {
            assert_eq!(
                errors.get(field).map(|m| m[0].as_str()),
                Some(format!("The {field} field is required.").as_str())
            );
        }
    }

    #[test]
    fn login_checks_password_length() {
        let err = login(&LoginRequest {
            email: Some("ann@x.com".into()),
            password: Some("12345".into()),
        })
        .unwrap_err();
        match err {
            AppError::Validation(errors) => assert!(errors.has("password")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn social_login_rejects_provider_outside_allow_list() {
        let allowed = ProviderAllowList::new(vec![Provider::Google]);
        let err = social_login(
            &SocialLoginRequest {
                provider: Some("github".into()),
                access_token: Some("tok".into()),
            },
            &allowed,
        )
        .unwrap_err();
        match err {
            AppError::Validation(errors) => assert!(errors.has("provider")),
            other => panic!("unexpected {other:?}"),
        }

        let ok = social_login(
            &SocialLoginRequest {
                provider: Some("google".into()),
                access_token: Some("tok".into()),
            },
            &allowed,
        )
        .unwrap();
        assert_eq!(ok.provider, Provider::Google);
    }
}
