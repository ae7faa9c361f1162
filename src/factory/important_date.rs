use chrono::{DateTime, FixedOffset};
use fake::{faker::lorem::en::Sentence, Dummy, Fake, Faker};
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::important_date::ImportantDate;

const CATEGORIES: [&str; 3] = ["Stena", "OMC", "PE3"];

pub struct ImportantDateFactory<T: Clone> {
    modifier_one: fn(x: &ImportantDate, ext: T) -> ImportantDate,
    modifier_many: fn(x: &ImportantDate, idx: usize, ext: T) -> ImportantDate,
}

impl<T: Clone> Default for ImportantDateFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn insert_important_date<'e, E: sqlx::PgExecutor<'e>>(
    db: E,
    data: &ImportantDate,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO public.important_date (id, week_number, year, category, description, date_value, notes, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
    )
    .bind(data.id)
    .bind(data.week_number)
    .bind(data.year)
    .bind(&data.category)
    .bind(&data.description)
    .bind(&data.date_value)
    .bind(&data.notes)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(db)
    .await?;
    Ok(())
}

impl<T: Clone> ImportantDateFactory<T> {
    pub fn new() -> Self {
        Self {
            modifier_one: |x, _| x.clone(),
            modifier_many: |x, _, _| x.clone(),
        }
    }

    pub fn modified_one(&mut self, modifier: fn(x: &ImportantDate, ext: T) -> ImportantDate) {
        self.modifier_one = modifier
    }

    pub fn modified_many(
        &mut self,
        modifier: fn(x: &ImportantDate, idx: usize, ext: T) -> ImportantDate,
    ) {
        self.modifier_many = modifier
    }

    pub async fn generate_one(&mut self, db: &PgPool, ext: T) -> anyhow::Result<ImportantDate> {
        let data = Faker.fake::<ImportantDateDummy>().into_important_date();
        let data = (self.modifier_one)(&data, ext);
        insert_important_date(db, &data).await?;
        Ok(data)
    }

    pub async fn generate_many(
        &mut self,
        db: &PgPool,
        num: u32,
        ext: T,
    ) -> anyhow::Result<Vec<ImportantDate>> {
        let mut result: Vec<ImportantDate> = vec![];
        for idx in 0..num as usize {
            let data = Faker.fake::<ImportantDateDummy>().into_important_date();
            result.push((self.modifier_many)(&data, idx, ext.clone()));
        }
        let mut tx = db.begin().await?;
        for item in result.iter() {
            insert_important_date(&mut *tx, item).await?;
        }
        tx.commit().await?;
        Ok(result)
    }
}

#[derive(Debug, Dummy, Clone)]
struct ImportantDateDummy {
    pub id: Uuid,
    #[dummy(faker = "1..54")]
    pub week_number: i32,
    #[dummy(faker = "2020..2031")]
    pub year: i32,
    #[dummy(faker = "0..3")]
    pub category_idx: usize,
    #[dummy(faker = "1..28")]
    pub first_day: u32,
    #[dummy(faker = "1..13")]
    pub month: u32,
    #[dummy(faker = "Sentence(2..6)")]
    pub description: String,
    pub notes: Option<String>,
    pub created_date: DateTime<FixedOffset>,
}

impl ImportantDateDummy {
    fn into_important_date(self) -> ImportantDate {
        ImportantDate {
            id: self.id,
            week_number: self.week_number,
            year: self.year,
            category: CATEGORIES[self.category_idx].to_string(),
            description: Some(self.description),
            // ids keep generated keys unique
            date_value: format!(
                "{}-{}/{} #{}",
                self.first_day,
                self.first_day + 2,
                self.month,
                self.id.simple()
            ),
            notes: self.notes,
            created_by: None,
            updated_by: None,
            created_date: Some(self.created_date),
            updated_date: Some(self.created_date),
        }
    }
}
