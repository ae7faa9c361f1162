use chrono::{DateTime, FixedOffset};
use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Dummy, Fake, Faker,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    core::security::hash_password,
    model::{role::UserRole, user::User},
};

pub const FACTORY_PASSWORD: &str = "password";

pub struct UserFactory<T: Clone> {
    modifier_one: fn(x: &User, ext: T) -> User,
    modifier_many: fn(x: &User, idx: usize, ext: T) -> User,
}

impl<T: Clone> Default for UserFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn insert_user<'e, E: sqlx::PgExecutor<'e>>(db: E, data: &User) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO public.user (id, email, password, full_name, role, is_active, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(data.id)
    .bind(&data.email)
    .bind(&data.password)
    .bind(&data.full_name)
    .bind(data.role.as_str())
    .bind(data.is_active)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(db)
    .await?;
    Ok(())
}

impl<T: Clone> UserFactory<T> {
    pub fn new() -> Self {
        Self {
            modifier_one: |x, _| x.clone(),
            modifier_many: |x, _, _| x.clone(),
        }
    }

    pub fn modified_one(&mut self, modifier: fn(x: &User, ext: T) -> User) {
        self.modifier_one = modifier
    }

    pub fn modified_many(&mut self, modifier: fn(x: &User, idx: usize, ext: T) -> User) {
        self.modifier_many = modifier
    }

    pub async fn generate_one(&mut self, db: &PgPool, ext: T) -> anyhow::Result<User> {
        let password = hash_password(FACTORY_PASSWORD).map_err(|err| anyhow::anyhow!("{}", err))?;
        let data = Faker.fake::<UserDummy>().into_user(&password);
        let data = (self.modifier_one)(&data, ext);
        insert_user(db, &data).await?;
        Ok(data)
    }

    pub async fn generate_many(
        &mut self,
        db: &PgPool,
        num: u32,
        ext: T,
    ) -> anyhow::Result<Vec<User>> {
        let password = hash_password(FACTORY_PASSWORD).map_err(|err| anyhow::anyhow!("{}", err))?;
        let mut result: Vec<User> = vec![];
        for idx in 0..num as usize {
            let data = Faker.fake::<UserDummy>().into_user(&password);
            result.push((self.modifier_many)(&data, idx, ext.clone()));
        }
        let mut tx = db.begin().await?;
        for item in result.iter() {
            insert_user(&mut *tx, item).await?;
        }
        tx.commit().await?;
        Ok(result)
    }
}

#[derive(Debug, Dummy, Clone)]
struct UserDummy {
    pub id: Uuid,
    #[dummy(faker = "SafeEmail()")]
    pub email: String,
    #[dummy(faker = "Name()")]
    pub full_name: String,
    #[dummy(faker = "0..5")]
    pub role_idx: usize,
    pub created_date: DateTime<FixedOffset>,
}

impl UserDummy {
    fn into_user(self, password: &str) -> User {
        User {
            id: self.id,
            // fake emails repeat often enough to trip the unique index
            email: format!("{}.{}", self.id.simple(), self.email),
            password: password.to_string(),
            full_name: Some(self.full_name),
            role: UserRole::ALL[self.role_idx],
            is_active: true,
            last_login_date: None,
            created_by: None,
            updated_by: None,
            created_date: Some(self.created_date),
            updated_date: Some(self.created_date),
        }
    }
}
