use axum::extract::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::entities::{Member, MemberProfile};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct PhoneParams {
    phone: String,
}

pub async fn register(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(profile): Json<MemberProfile>,
) -> Result<Json<Member>, Error> {
    let member = api.register_member(user, profile).await?;

    Ok(member.into())
}

pub async fn find(Extension(api): Extension<DynAPI>, user: User) -> Result<Json<Member>, Error> {
    let member = api.find_member(user).await?;

    Ok(member.into())
}

pub async fn update_phone(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<PhoneParams>,
) -> Result<Json<Member>, Error> {
    let member = api.update_phone(user, params.phone).await?;

    Ok(member.into())
}
