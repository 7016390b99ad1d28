use crate::{
    entities::{payment, Payment},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::warn;

/// Generates globally unique payment references of the shape
/// `REF-YYYYMM-NNNNN`.
///
/// Candidates are checked against the payments table on the caller's
/// connection; a bounded number of collisions is retried before the
/// attempt fails. The unique index on `reference_number` remains the
/// final arbiter for generators racing on the same candidate.
#[derive(Clone, Debug)]
pub struct ReferenceGenerator {
    max_attempts: u32,
}

impl ReferenceGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Formats a candidate reference for the given instant and sequence.
    pub fn candidate(now: DateTime<Utc>, sequence: u32) -> String {
        format!("REF-{}-{:05}", now.format("%Y%m"), sequence % 100_000)
    }

    pub async fn generate_unique<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<String, ServiceError> {
        for attempt in 1..=self.max_attempts {
            let sequence = rand::thread_rng().gen_range(0..100_000u32);
            let candidate = Self::candidate(Utc::now(), sequence);

            let taken = Payment::find()
                .filter(payment::Column::ReferenceNumber.eq(&candidate))
                .count(conn)
                .await?
                > 0;
            if !taken {
                return Ok(candidate);
            }
            warn!(attempt, %candidate, "payment reference collision, retrying");
        }

        Err(ServiceError::ReferenceGenerationFailed)
    }
}
