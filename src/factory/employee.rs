use chrono::{DateTime, FixedOffset};
use fake::{
    faker::{
        address::en::CityName,
        internet::en::SafeEmail,
        name::en::{FirstName, LastName},
        phone_number::en::CellNumber,
    },
    Dummy, Fake, Faker,
};
use serde_json::Map;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::model::employee::Employee;

pub struct EmployeeFactory<T: Clone> {
    modifier_one: fn(x: &Employee, ext: T) -> Employee,
    modifier_many: fn(x: &Employee, idx: usize, ext: T) -> Employee,
}

impl<T: Clone> Default for EmployeeFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn insert_employee<'e, E: sqlx::PgExecutor<'e>>(db: E, data: &Employee) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO public.employee (id, first_name, last_name, ssn, email, mobile, rank, gender, town_district,
            stena_date, omc_date, pe3_date, comments, is_terminated, termination_date, termination_reason,
            is_archived, archived_date, custom_fields, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"#,
    )
    .bind(data.id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.ssn)
    .bind(&data.email)
    .bind(&data.mobile)
    .bind(&data.rank)
    .bind(&data.gender)
    .bind(&data.town_district)
    .bind(data.stena_date)
    .bind(data.omc_date)
    .bind(data.pe3_date)
    .bind(&data.comments)
    .bind(data.is_terminated)
    .bind(data.termination_date)
    .bind(&data.termination_reason)
    .bind(data.is_archived)
    .bind(data.archived_date)
    .bind(&data.custom_fields)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(db)
    .await?;
    Ok(())
}

impl<T: Clone> EmployeeFactory<T> {
    pub fn new() -> Self {
        Self {
            modifier_one: |x, _| x.clone(),
            modifier_many: |x, _, _| x.clone(),
        }
    }

    pub fn modified_one(&mut self, modifier: fn(x: &Employee, ext: T) -> Employee) {
        self.modifier_one = modifier
    }

    pub fn modified_many(&mut self, modifier: fn(x: &Employee, idx: usize, ext: T) -> Employee) {
        self.modifier_many = modifier
    }

    pub async fn generate_one(&mut self, db: &PgPool, ext: T) -> anyhow::Result<Employee> {
        let data = Faker.fake::<EmployeeDummy>().into_employee();
        let data = (self.modifier_one)(&data, ext);
        insert_employee(db, &data).await?;
        Ok(data)
    }

    pub async fn generate_many(
        &mut self,
        db: &PgPool,
        num: u32,
        ext: T,
    ) -> anyhow::Result<Vec<Employee>> {
        let mut result: Vec<Employee> = vec![];
        for idx in 0..num as usize {
            let data = Faker.fake::<EmployeeDummy>().into_employee();
            result.push((self.modifier_many)(&data, idx, ext.clone()));
        }
        let mut tx = db.begin().await?;
        for item in result.iter() {
            insert_employee(&mut *tx, item).await?;
        }
        tx.commit().await?;
        Ok(result)
    }
}

#[derive(Debug, Dummy, Clone)]
struct EmployeeDummy {
    pub id: Uuid,
    #[dummy(faker = "FirstName()")]
    pub first_name: String,
    #[dummy(faker = "LastName()")]
    pub last_name: String,
    #[dummy(faker = "19500101..20051231")]
    pub birth: u32,
    #[dummy(faker = "SafeEmail()")]
    pub email: String,
    #[dummy(faker = "CellNumber()")]
    pub mobile: String,
    #[dummy(faker = "CityName()")]
    pub town_district: String,
    pub created_date: DateTime<FixedOffset>,
}

impl EmployeeDummy {
    fn into_employee(self) -> Employee {
        // the id tail keeps generated ssn values unique
        let suffix = &self.id.simple().to_string()[28..];
        Employee {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            ssn: format!("{}-{}", self.birth, suffix),
            email: Some(self.email),
            mobile: Some(self.mobile),
            rank: None,
            gender: None,
            town_district: Some(self.town_district),
            stena_date: None,
            omc_date: None,
            pe3_date: None,
            comments: None,
            is_terminated: false,
            termination_date: None,
            termination_reason: None,
            is_archived: false,
            archived_date: None,
            custom_fields: Json(Map::new()),
            created_by: None,
            updated_by: None,
            created_date: Some(self.created_date),
            updated_date: Some(self.created_date),
        }
    }
}
