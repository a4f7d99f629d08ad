//! Registration Validation
//!
//! Shape checks for registration input. Every failing field is reported,
//! not just the first. Which address fields are mandatory depends on the
//! role and is spelled out in [`required_address_fields`].

use serde::Serialize;

use super::entity::user::{Address, UserProfile};
use super::value_object::{email::Email, user_password::RawPassword, user_role::UserRole};

const MAX_NAME_LEN: usize = 100;
const MAX_COMPANY_LEN: usize = 200;
const TAX_ID_LEN: std::ops::RangeInclusive<usize> = 5..=32;
const PHONE_LEN: std::ops::RangeInclusive<usize> = 7..=20;

/// One rejected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Unvalidated registration payload
#[derive(Clone, Default)]
pub struct RegistrationInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl std::fmt::Debug for RegistrationInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationInput")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

/// Input that passed every check
#[derive(Debug)]
pub struct ValidatedRegistration {
    pub email: Email,
    pub password: RawPassword,
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    Street,
    City,
    PostalCode,
    Country,
}

impl AddressField {
    pub const ALL: [Self; 4] = [Self::Street, Self::City, Self::PostalCode, Self::Country];

    fn name(&self) -> &'static str {
        match self {
            Self::Street => "street",
            Self::City => "city",
            Self::PostalCode => "postalCode",
            Self::Country => "country",
        }
    }

    fn value<'a>(&self, input: &'a RegistrationInput) -> Option<&'a str> {
        let value = match self {
            Self::Street => &input.street,
            Self::City => &input.city,
            Self::PostalCode => &input.postal_code,
            Self::Country => &input.country,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Address fields an account of `role` must provide
pub fn required_address_fields(role: UserRole) -> &'static [AddressField] {
    match role {
        UserRole::Admin => &[],
        UserRole::User => &AddressField::ALL,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_name(field: &'static str, value: &str, errors: &mut Vec<FieldError>) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.push(FieldError::new(field, "This field is required"));
    } else if value.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new(
            field,
            format!("Must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    value.to_string()
}

/// Validate a registration for an account of `role`
pub fn validate_registration(
    mut input: RegistrationInput,
    role: UserRole,
) -> Result<ValidatedRegistration, Vec<FieldError>> {
    let mut errors = Vec::new();

    let email = Email::new(&input.email)
        .map_err(|e| errors.push(FieldError::new("email", e.message())))
        .ok();

    let password = RawPassword::new(std::mem::take(&mut input.password))
        .map_err(|e| errors.push(FieldError::new("password", e.to_string())))
        .ok();

    let first_name = check_name("firstName", &input.first_name, &mut errors);
    let last_name = check_name("lastName", &input.last_name, &mut errors);

    let company_name = non_empty(&input.company_name);
    if company_name
        .as_deref()
        .is_some_and(|c| c.chars().count() > MAX_COMPANY_LEN)
    {
        errors.push(FieldError::new(
            "companyName",
            format!("Must be at most {MAX_COMPANY_LEN} characters"),
        ));
    }

    let tax_id = non_empty(&input.tax_id);
    if let Some(tax_id) = tax_id.as_deref() {
        let well_formed = TAX_ID_LEN.contains(&tax_id.len())
            && tax_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !well_formed {
            errors.push(FieldError::new(
                "taxId",
                "Must be 5-32 letters, digits or hyphens",
            ));
        }
    }

    let phone = non_empty(&input.phone);
    if let Some(phone) = phone.as_deref() {
        let well_formed = PHONE_LEN.contains(&phone.len())
            && phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
        if !well_formed {
            errors.push(FieldError::new("phone", "Invalid phone number"));
        }
    }

    for field in required_address_fields(role) {
        if field.value(&input).is_none() {
            errors.push(FieldError::new(field.name(), "This field is required"));
        }
    }

    let address = match AddressField::ALL.map(|f| f.value(&input)) {
        [Some(street), Some(city), Some(postal_code), Some(country)] => Some(Address {
            street: street.to_string(),
            city: city.to_string(),
            postal_code: postal_code.to_string(),
            country: country.to_string(),
        }),
        _ => None,
    };

    match (email, password) {
        (Some(email), Some(password)) if errors.is_empty() => Ok(ValidatedRegistration {
            email,
            password,
            profile: UserProfile {
                first_name,
                last_name,
                company_name,
                tax_id,
                phone,
                address,
            },
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> RegistrationInput {
        RegistrationInput {
            email: "Alice@Example.com".into(),
            password: "Str0ng!Passphrase".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            company_name: Some("Wonderland GmbH".into()),
            tax_id: Some("DE-123456789".into()),
            phone: Some("+49 30 1234567".into()),
            street: Some("Rabbit Hole 1".into()),
            city: Some("Berlin".into()),
            postal_code: Some("10115".into()),
            country: Some("DE".into()),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.field).collect()
    }

    #[test]
    fn test_valid_registration() {
        let validated = validate_registration(valid_input(), UserRole::User).unwrap();
        assert_eq!(validated.email.as_str(), "alice@example.com");
        assert_eq!(validated.profile.tax_id.as_deref(), Some("DE-123456789"));
        assert!(validated.profile.address.is_some());
    }

    #[test]
    fn test_reports_every_failing_field() {
        let input = RegistrationInput {
            email: "not-an-email".into(),
            password: "weak".into(),
            first_name: "  ".into(),
            tax_id: Some("x".into()),
            ..valid_input()
        };
        let errors = validate_registration(input, UserRole::User).unwrap_err();
        assert_eq!(fields(&errors), vec!["email", "password", "firstName", "taxId"]);
    }

    #[test]
    fn test_address_required_for_users_only() {
        let input = RegistrationInput {
            street: None,
            city: Some(" ".into()),
            postal_code: None,
            country: None,
            ..valid_input()
        };

        let errors = validate_registration(input.clone(), UserRole::User).unwrap_err();
        assert_eq!(fields(&errors), vec!["street", "city", "postalCode", "country"]);

        let validated = validate_registration(input, UserRole::Admin).unwrap();
        assert!(validated.profile.address.is_none());
    }

    #[test]
    fn test_required_address_fields_by_role() {
        assert!(required_address_fields(UserRole::Admin).is_empty());
        assert_eq!(required_address_fields(UserRole::User).len(), 4);
    }
}
