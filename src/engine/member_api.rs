use super::Engine;

use async_trait::async_trait;

use crate::{
    api::MemberAPI,
    auth::User,
    entities::{Member, MemberProfile},
    error::Error,
};

#[async_trait]
impl MemberAPI for Engine {
    #[tracing::instrument(skip(self, profile))]
    async fn register_member(&self, user: User, profile: MemberProfile) -> Result<Member, Error> {
        let submitted = Member::from_profile(&user, profile)?;

        let member = match self.bounded(self.store.find_member(user.id)).await {
            Ok(mut existing) => {
                existing.merge(submitted);
                existing
            }
            Err(err) if err.is_not_found_error() => submitted,
            Err(err) => return Err(err),
        };

        self.bounded(self.store.save_member(&member)).await?;

        Ok(member)
    }

    #[tracing::instrument(skip(self, phone))]
    async fn update_phone(&self, user: User, phone: String) -> Result<Member, Error> {
        let mut member = self.bounded(self.store.find_member(user.id)).await?;
        member.update_phone(&phone)?;

        self.bounded(self.store.save_member(&member)).await?;

        Ok(member)
    }

    #[tracing::instrument(skip(self))]
    async fn find_member(&self, user: User) -> Result<Member, Error> {
        self.bounded(self.store.find_member(user.id)).await
    }
}
