use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::error::Error;

/// Contact profile of a registered user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemberProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub picture: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl Member {
    /// Builds a member from submitted details, falling back to the claims
    /// carried by the identity token.
    pub fn from_profile(user: &User, profile: MemberProfile) -> Result<Self, Error> {
        let name = non_empty(profile.name.as_deref()).or_else(|| non_empty(user.name.as_deref()));
        let email =
            non_empty(profile.email.as_deref()).or_else(|| non_empty(user.email.as_deref()));

        let mut missing = vec![];
        if name.is_none() {
            missing.push("name".to_string());
        }
        if email.is_none() {
            missing.push("email".to_string());
        }

        match (name, email) {
            (Some(name), Some(email)) => {
                let now = Utc::now();

                Ok(Self {
                    id: user.id,
                    name,
                    email,
                    phone: non_empty(profile.phone.as_deref()).unwrap_or_default(),
                    picture: non_empty(profile.picture.as_deref())
                        .or_else(|| user.picture.clone()),
                    created_at: now,
                    updated_at: now,
                })
            }
            _ => Err(Error::invalid_fields_error(missing)),
        }
    }

    /// Applies a re-registration while keeping the original creation time.
    pub fn merge(&mut self, other: Member) {
        self.name = other.name;
        self.email = other.email;
        if !other.phone.is_empty() {
            self.phone = other.phone;
        }
        if other.picture.is_some() {
            self.picture = other.picture;
        }
        self.updated_at = Utc::now();
    }

    pub fn update_phone(&mut self, phone: &str) -> Result<(), Error> {
        let phone = phone.trim();

        let valid = phone.len() >= 7
            && phone
                .chars()
                .enumerate()
                .all(|(i, c)| c.is_ascii_digit() || (i == 0 && c == '+'));

        if !valid {
            return Err(Error::invalid_fields_error(vec!["phone".into()]));
        }

        self.phone = phone.to_string();
        self.updated_at = Utc::now();

        Ok(())
    }
}

#[test]
fn profile_falls_back_to_claims_test() {
    let user = User {
        id: Uuid::new_v4(),
        name: Some("Ravi".into()),
        email: Some("ravi@example.com".into()),
        picture: Some("https://example.com/ravi.png".into()),
    };

    let member = Member::from_profile(&user, MemberProfile::default()).unwrap();
    assert_eq!(member.id, user.id);
    assert_eq!(member.name, "Ravi");
    assert_eq!(member.picture.as_deref(), Some("https://example.com/ravi.png"));
    assert!(member.phone.is_empty());

    let anonymous = User {
        id: Uuid::new_v4(),
        name: None,
        email: None,
        picture: None,
    };
    let err = Member::from_profile(&anonymous, MemberProfile::default()).unwrap_err();
    assert_eq!(err.fields, vec!["name", "email"]);
}

#[test]
fn update_phone_test() {
    let user = User {
        id: Uuid::new_v4(),
        name: Some("Ravi".into()),
        email: Some("ravi@example.com".into()),
        picture: None,
    };
    let mut member = Member::from_profile(&user, MemberProfile::default()).unwrap();

    member.update_phone(" +919812345678 ").unwrap();
    assert_eq!(member.phone, "+919812345678");

    assert!(member.update_phone("12ab").unwrap_err().is_invalid_input_error());
    assert!(member.update_phone("98+1234567").is_err());
    assert_eq!(member.phone, "+919812345678");
}
