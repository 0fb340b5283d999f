//! Data models for Bibliotheca

/// Store a string-like enum (`as_str` + `FromStr<Err = String>`) in a TEXT column
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}
pub(crate) use text_column;

pub mod auth;
pub mod book;
pub mod loan;
pub mod member;
pub mod page;

// Re-export commonly used types
pub use auth::MemberClaims;
pub use book::{Book, CreateBook, UpdateBook};
pub use loan::{Loan, LoanDetails, LoanStatus, OverdueLoan};
pub use member::{Member, Role};
pub use page::{Page, PageRequest, SortOrder};
