//! Read side of employee storage
//!
//! [`EmployeeStore`] extends the pipeline's [`RecordSink`] with the queries
//! the HTTP endpoints need, so one value serves both the writers and the
//! readers.

use async_trait::async_trait;
use roster_common::{Result, RosterError};
use roster_ingest::{Employee, MemorySink, PgSink, RecordSink};
use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

/// Default page size for `/records`.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page `/records` will return.
pub const MAX_PAGE_LIMIT: u32 = 1_000;

/// A stored employee with its storage-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredEmployee {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i32,
    pub gender: String,
    pub department: String,
    pub company: String,
    pub salary: f64,
    pub date_joined: String,
    pub is_active: bool,
}

impl StoredEmployee {
    fn from_employee(id: i64, employee: Employee) -> Self {
        Self {
            id,
            first_name: employee.first_name,
            last_name: employee.last_name,
            email: employee.email,
            age: employee.age,
            gender: employee.gender,
            department: employee.department,
            company: employee.company,
            salary: employee.salary,
            date_joined: employee.date_joined,
            is_active: employee.is_active,
        }
    }
}

/// Columns `/records` may sort by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Id,
    FirstName,
    LastName,
    Email,
    Age,
    Gender,
    Department,
    Company,
    Salary,
    DateJoined,
    IsActive,
}

impl SortColumn {
    /// Parse a query parameter; anything unknown sorts by id
    pub fn from_param(param: &str) -> Self {
        param.parse().unwrap_or_default()
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::FirstName => "first_name",
            SortColumn::LastName => "last_name",
            SortColumn::Email => "email",
            SortColumn::Age => "age",
            SortColumn::Gender => "gender",
            SortColumn::Department => "department",
            SortColumn::Company => "company",
            SortColumn::Salary => "salary",
            SortColumn::DateJoined => "date_joined",
            SortColumn::IsActive => "is_active",
        }
    }

    fn compare(&self, a: &StoredEmployee, b: &StoredEmployee) -> Ordering {
        match self {
            SortColumn::Id => a.id.cmp(&b.id),
            SortColumn::FirstName => a.first_name.cmp(&b.first_name),
            SortColumn::LastName => a.last_name.cmp(&b.last_name),
            SortColumn::Email => a.email.cmp(&b.email),
            SortColumn::Age => a.age.cmp(&b.age),
            SortColumn::Gender => a.gender.cmp(&b.gender),
            SortColumn::Department => a.department.cmp(&b.department),
            SortColumn::Company => a.company.cmp(&b.company),
            SortColumn::Salary => a.salary.total_cmp(&b.salary),
            SortColumn::DateJoined => a.date_joined.cmp(&b.date_joined),
            SortColumn::IsActive => a.is_active.cmp(&b.is_active),
        }
    }
}

impl FromStr for SortColumn {
    type Err = RosterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "id" => Ok(SortColumn::Id),
            "first_name" => Ok(SortColumn::FirstName),
            "last_name" => Ok(SortColumn::LastName),
            "email" => Ok(SortColumn::Email),
            "age" => Ok(SortColumn::Age),
            "gender" => Ok(SortColumn::Gender),
            "department" => Ok(SortColumn::Department),
            "company" => Ok(SortColumn::Company),
            "salary" => Ok(SortColumn::Salary),
            "date_joined" => Ok(SortColumn::DateJoined),
            "is_active" => Ok(SortColumn::IsActive),
            _ => Err(RosterError::Parse(format!("Unknown sort column: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse a query parameter; anything but `desc` is ascending
    pub fn from_param(param: &str) -> Self {
        if param.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One page of `/records`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based
    pub page: u32,
    pub limit: u32,
    pub sort: SortColumn,
    pub order: SortOrder,
}

impl PageRequest {
    /// Clamp raw parameters into a valid request
    pub fn new(page: Option<u32>, limit: Option<u32>, sort: SortColumn, order: SortOrder) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            sort,
            order,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, SortColumn::default(), SortOrder::default())
    }
}

/// Employee storage the server reads back from
#[async_trait]
pub trait EmployeeStore: RecordSink {
    /// Number of stored employees
    async fn count(&self) -> Result<i64>;

    /// One sorted page; ties are broken by id
    async fn page(&self, request: &PageRequest) -> Result<Vec<StoredEmployee>>;

    /// Cheap reachability check for `/health`
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl EmployeeStore for MemorySink {
    async fn count(&self) -> Result<i64> {
        Ok(self.len().await as i64)
    }

    async fn page(&self, request: &PageRequest) -> Result<Vec<StoredEmployee>> {
        // Ids follow write-completion order, like a serial column
        let mut rows: Vec<StoredEmployee> = self
            .records()
            .await
            .into_iter()
            .zip(1_i64..)
            .map(|(employee, id)| StoredEmployee::from_employee(id, employee))
            .collect();

        rows.sort_by(|a, b| {
            let ordering = request.sort.compare(a, b);
            let ordering = match request.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(request.limit as usize)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn database_error(e: sqlx::Error) -> RosterError {
    RosterError::Database(e.to_string())
}

#[async_trait]
impl EmployeeStore for PgSink {
    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees")
            .fetch_one(self.pool())
            .await
            .map_err(database_error)
    }

    async fn page(&self, request: &PageRequest) -> Result<Vec<StoredEmployee>> {
        // Column and direction come from closed enums, never from the request text
        let sql = format!(
            r#"
            SELECT id, first_name, last_name, email, age, gender,
                   department, company, salary, date_joined, is_active
            FROM employees
            ORDER BY {} {}, id ASC
            LIMIT $1 OFFSET $2
            "#,
            request.sort.as_sql(),
            request.order.as_sql()
        );

        sqlx::query_as::<_, StoredEmployee>(&sql)
            .bind(i64::from(request.limit))
            .bind(request.offset() as i64)
            .fetch_all(self.pool())
            .await
            .map_err(database_error)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(database_error)
    }
}
