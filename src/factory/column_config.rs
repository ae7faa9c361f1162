use chrono::{DateTime, FixedOffset};
use fake::{faker::lorem::en::Word, Dummy, Fake, Faker};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    core::permission::default_custom_permissions,
    model::{
        column_config::{ColumnConfig, ColumnDataType},
        role::UserRole,
    },
};

/// Custom (non masterdata) columns owned by HR Admin unless modified.
pub struct ColumnConfigFactory<T: Clone> {
    modifier_one: fn(x: &ColumnConfig, ext: T) -> ColumnConfig,
    modifier_many: fn(x: &ColumnConfig, idx: usize, ext: T) -> ColumnConfig,
}

impl<T: Clone> Default for ColumnConfigFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn insert_column_config<'e, E: sqlx::PgExecutor<'e>>(
    db: E,
    data: &ColumnConfig,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO public.column_config (id, column_name, display_name, data_type, is_masterdata, category,
            display_order, is_visible, owner_role, options, role_permissions, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
    )
    .bind(data.id)
    .bind(&data.column_name)
    .bind(&data.display_name)
    .bind(data.data_type.as_str())
    .bind(data.is_masterdata)
    .bind(&data.category)
    .bind(data.display_order)
    .bind(data.is_visible)
    .bind(&data.owner_role)
    .bind(&data.options)
    .bind(&data.role_permissions)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(db)
    .await?;
    Ok(())
}

impl<T: Clone> ColumnConfigFactory<T> {
    pub fn new() -> Self {
        Self {
            modifier_one: |x, _| x.clone(),
            modifier_many: |x, _, _| x.clone(),
        }
    }

    pub fn modified_one(&mut self, modifier: fn(x: &ColumnConfig, ext: T) -> ColumnConfig) {
        self.modifier_one = modifier
    }

    pub fn modified_many(
        &mut self,
        modifier: fn(x: &ColumnConfig, idx: usize, ext: T) -> ColumnConfig,
    ) {
        self.modifier_many = modifier
    }

    pub async fn generate_one(&mut self, db: &PgPool, ext: T) -> anyhow::Result<ColumnConfig> {
        let data = Faker.fake::<ColumnConfigDummy>().into_column_config();
        let data = (self.modifier_one)(&data, ext);
        insert_column_config(db, &data).await?;
        Ok(data)
    }

    pub async fn generate_many(
        &mut self,
        db: &PgPool,
        num: u32,
        ext: T,
    ) -> anyhow::Result<Vec<ColumnConfig>> {
        let mut result: Vec<ColumnConfig> = vec![];
        for idx in 0..num as usize {
            let data = Faker.fake::<ColumnConfigDummy>().into_column_config();
            result.push((self.modifier_many)(&data, idx, ext.clone()));
        }
        let mut tx = db.begin().await?;
        for item in result.iter() {
            insert_column_config(&mut *tx, item).await?;
        }
        tx.commit().await?;
        Ok(result)
    }
}

#[derive(Debug, Dummy, Clone)]
struct ColumnConfigDummy {
    pub id: Uuid,
    #[dummy(faker = "Word()")]
    pub word: String,
    #[dummy(faker = "100..1000")]
    pub display_order: i32,
    pub created_date: DateTime<FixedOffset>,
}

impl ColumnConfigDummy {
    fn into_column_config(self) -> ColumnConfig {
        let column_name = format!("{}_{}", self.word, &self.id.simple().to_string()[..8]);
        ColumnConfig {
            id: self.id,
            display_name: column_name.replace('_', " "),
            column_name,
            data_type: ColumnDataType::Text,
            is_masterdata: false,
            category: Some("Custom".to_string()),
            display_order: self.display_order,
            is_visible: true,
            owner_role: Some(UserRole::HrAdmin.to_string()),
            options: None,
            role_permissions: Json(default_custom_permissions(UserRole::HrAdmin)),
            created_by: None,
            updated_by: None,
            created_date: Some(self.created_date),
            updated_date: Some(self.created_date),
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use crate::{
        factory::column_config::ColumnConfigFactory,
        model::{column_config::ColumnConfig, role::UserRole},
    };

    #[sqlx::test]
    async fn test_generate_many(pool: PgPool) -> anyhow::Result<()> {
        // When
        let mut factory = ColumnConfigFactory::<UserRole>::new();
        factory.modified_many(|x, _, owner| ColumnConfig {
            owner_role: Some(owner.to_string()),
            ..x.clone()
        });
        factory.generate_many(&pool, 3, UserRole::Toplux).await?;

        // Expect
        let num_data: (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM public.column_config WHERE owner_role = 'toplux'"#,
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(num_data.0, 3);
        Ok(())
    }
}
