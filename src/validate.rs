use serde_json::{Map, Value};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::ContactError;
use crate::models::{ContactForm, FieldViolation, SubmissionRequest};

// Report order for violations; ValidationErrors is a HashMap.
const FIELD_ORDER: [&str; 3] = ["name", "email", "message"];
const FORM_FIELDS: [&str; 5] = ["name", "email", "company", "message", "website"];

pub(crate) fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message(Cow::Borrowed("Must not be blank")));
    }
    Ok(())
}

pub fn parse_form(body: &[u8]) -> Result<ContactForm, ContactError> {
    let fields: Map<String, Value> = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejecting submission body: {}", e);
        ContactError::Validation(vec![FieldViolation {
            field: "body".to_string(),
            message: "Expected a JSON object".to_string(),
        }])
    })?;

    let mistyped: Vec<FieldViolation> = FORM_FIELDS
        .iter()
        .filter(|f| matches!(fields.get(**f), Some(v) if !v.is_string() && !v.is_null()))
        .map(|f| FieldViolation {
            field: f.to_string(),
            message: "Expected a string".to_string(),
        })
        .collect();
    if !mistyped.is_empty() {
        return Err(ContactError::Validation(mistyped));
    }

    // Every known field is now a string or null, so this cannot fail on types.
    serde_json::from_value(Value::Object(fields)).map_err(|e| {
        ContactError::Validation(vec![FieldViolation {
            field: "body".to_string(),
            message: format!("Unreadable submission: {}", e),
        }])
    })
}

pub fn validate(form: ContactForm) -> Result<SubmissionRequest, ContactError> {
    form.validate().map_err(|e| ContactError::Validation(violations(&e)))?;

    Ok(SubmissionRequest {
        name: form.name,
        email: form.email,
        company: form.company.unwrap_or_default(),
        message: form.message,
        website: form.website.unwrap_or_default(),
    })
}

fn violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out: Vec<FieldViolation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldViolation {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Invalid value".to_string()),
            })
        })
        .collect();
    out.sort_by_key(|v| {
        FIELD_ORDER
            .iter()
            .position(|f| *f == v.field)
            .unwrap_or(FIELD_ORDER.len())
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, email: &str, message: &str) -> ContactForm {
        ContactForm {
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    fn fields(err: ContactError) -> Vec<String> {
        match err {
            ContactError::Validation(v) => v.into_iter().map(|v| v.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_minimal_submission_and_normalizes_optionals() {
        let ok = validate(form("Jane", "jane@x.com", "Hi")).unwrap();
        assert_eq!(ok.company, "");
        assert_eq!(ok.website, "");
        assert!(!ok.is_automated());
    }

    #[test]
    fn reports_every_failing_field_in_order() {
        let err = validate(form("", "", "")).unwrap_err();
        assert_eq!(fields(err), vec!["name", "email", "message"]);
    }

    #[test]
    fn whitespace_name_is_blank() {
        let err = validate(form("   ", "jane@x.com", "Hi")).unwrap_err();
        assert_eq!(fields(err), vec!["name"]);
    }

    #[test]
    fn rejects_malformed_email() {
        let err = validate(form("Jane", "not-an-email", "Hi")).unwrap_err();
        match err {
            ContactError::Validation(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].field, "email");
                assert_eq!(v[0].message, "Invalid email address");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn honeypot_does_not_affect_validity() {
        let mut f = form("Jane", "jane@x.com", "Hi");
        f.website = Some("http://spam.example".to_string());
        let ok = validate(f).unwrap();
        assert!(ok.is_automated());
    }

    #[test]
    fn non_object_body_is_a_body_violation() {
        let err = parse_form(b"not json").unwrap_err();
        assert_eq!(fields(err), vec!["body"]);
        let err = parse_form(br#"["Jane", "jane@x.com"]"#).unwrap_err();
        assert_eq!(fields(err), vec!["body"]);
    }

    #[test]
    fn mistyped_fields_are_named() {
        let err = parse_form(br#"{"name":"Jane","email":5,"message":"Hi"}"#)
            .and_then(validate)
            .unwrap_err();
        match err {
            ContactError::Validation(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].field, "email");
                assert_eq!(v[0].message, "Expected a string");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = parse_form(br#"{"name":["x"],"email":"a@b.co","message":"Hi","website":true}"#)
            .unwrap_err();
        assert_eq!(fields(err), vec!["name", "website"]);
    }

    #[test]
    fn unknown_and_null_fields_are_tolerated() {
        let form = parse_form(br#"{"name":"Jane","email":"a@b.co","message":"Hi","company":null,"extra":1}"#)
            .unwrap();
        assert!(form.company.is_none());
        assert!(validate(form).is_ok());
    }
}
