pub mod authorizor;
mod identity;
mod platform;
mod user;

pub use identity::{
    bearer_token, DynIdentityProvider, IdentityProvider, RemoteIdentityProvider,
    StaticIdentityProvider,
};
pub use platform::Platform;
pub use user::User;
