//! Employee records and the row parser
//!
//! Rows map positionally onto [`Employee`]:
//!
//! ```text
//! first_name, last_name, email, age, gender, department, company, salary, date_joined, is_active
//! ```
//!
//! optionally preceded by `leading_columns` ignored columns (exports that
//! carry a row id in the first column).

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, RowParseError};

/// One raw delimited row, fields in file order
pub type RawRow = csv_async::StringRecord;

/// Number of mapped columns in a row
pub const EMPLOYEE_FIELD_COUNT: usize = 10;

const AGE: usize = 3;
const SALARY: usize = 7;

/// A validated employee row, ready for a bulk write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i32,
    pub gender: String,
    pub department: String,
    pub company: String,
    pub salary: f64,
    /// Kept as written in the file
    pub date_joined: String,
    pub is_active: bool,
}

/// Converts [`RawRow`]s into [`Employee`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser {
    leading_columns: usize,
}

impl RecordParser {
    pub fn new(leading_columns: usize) -> Self {
        Self { leading_columns }
    }

    /// Parse one data row.
    ///
    /// `row` is the 1-based data row number, used only for error reporting.
    /// Age must be an integer and salary a number; the active flag is `true`
    /// only for a case-insensitive `"true"` and never fails.
    pub fn parse(&self, row: u64, raw: &RawRow) -> Result<Employee, RowParseError> {
        self.parse_fields(raw).map_err(|cause| RowParseError { row, cause })
    }

    fn parse_fields(&self, raw: &RawRow) -> Result<Employee, FieldError> {
        let expected = self.leading_columns + EMPLOYEE_FIELD_COUNT;
        if raw.len() < expected {
            return Err(FieldError::MissingFields {
                expected,
                found: raw.len(),
            });
        }

        let field = move |idx: usize| raw.get(self.leading_columns + idx).unwrap_or_default();

        let age = field(AGE);
        let age = age.parse::<i32>().map_err(|source| FieldError::InvalidInteger {
            field: "age",
            value: age.to_string(),
            source,
        })?;

        let raw_salary = field(SALARY);
        let salary = raw_salary.parse::<f64>().map_err(|source| FieldError::InvalidFloat {
            field: "salary",
            value: raw_salary.to_string(),
            source,
        })?;
        // Overflowing literals parse to infinity
        if !salary.is_finite() {
            return Err(FieldError::OutOfRange {
                field: "salary",
                value: raw_salary.to_string(),
            });
        }

        Ok(Employee {
            first_name: field(0).to_string(),
            last_name: field(1).to_string(),
            email: field(2).to_string(),
            age,
            gender: field(4).to_string(),
            department: field(5).to_string(),
            company: field(6).to_string(),
            salary,
            date_joined: field(8).to_string(),
            is_active: field(9).eq_ignore_ascii_case("true"),
        })
    }
}
