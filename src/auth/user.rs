use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving stable user ids from identity provider subjects.
const SUBJECT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b5_4d0a_8e27_51c9_0b3d_7a14);

/// The caller of a command, resolved from the request's bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            email: None,
            picture: None,
        }
    }

    /// Maps an identity provider's opaque subject onto a stable id.
    pub fn from_subject(subject: &str) -> Self {
        Self::new(Uuid::new_v5(&SUBJECT_NAMESPACE, subject.as_bytes()))
    }

    fn id_equals(&self, id: Uuid) -> bool {
        self.id == id
    }

    fn id_in(&self, ids: Vec<Uuid>) -> bool {
        ids.iter().any(|id| id == &self.id)
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id)
            .add_method("id_equals", User::id_equals)
            .add_method("id_in", User::id_in)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}

#[test]
fn subject_mapping_is_stable_test() {
    let a = User::from_subject("firebase-uid-123");
    let b = User::from_subject("firebase-uid-123");
    let c = User::from_subject("firebase-uid-124");

    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id);
}

#[test]
fn id_helpers_test() {
    let user = User::new(Uuid::new_v4());

    assert!(user.id_equals(user.id));
    assert!(!user.id_equals(Uuid::new_v4()));
    assert!(user.id_in(vec![Uuid::new_v4(), user.id]));
    assert!(!user.id_in(vec![]));
}
