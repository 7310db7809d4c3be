//! Reservation batches from CSV.
//!
//! Expected header: `last_name,reservation_code,email,date_of_birth,provider`
//! (`airline` is accepted for the last column). Any bad row rejects the whole
//! file before a browser is started.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{BatchError, ConfigError};
use crate::types::{DateOfBirth, Provider, ReservationRequest};

#[derive(Debug, Deserialize)]
struct Row {
    last_name: String,
    reservation_code: String,
    email: String,
    date_of_birth: String,
    #[serde(alias = "airline")]
    provider: String,
}

impl Row {
    fn into_request(self) -> Result<ReservationRequest, ConfigError> {
        let date_of_birth: DateOfBirth = self.date_of_birth.parse()?;
        let provider: Provider = self.provider.parse()?;
        Ok(ReservationRequest::new(
            self.last_name,
            self.reservation_code,
            self.email,
            date_of_birth,
            provider,
        ))
    }
}

pub fn read_reservations(path: &Path) -> Result<Vec<ReservationRequest>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| BatchError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let mut requests = Vec::new();
    for (i, row) in reader.deserialize::<Row>().enumerate() {
        // Records are numbered from 1, not counting the header.
        let record = i + 1;
        let row = row.map_err(|source| BatchError::Record {
            path: path.to_path_buf(),
            record,
            source,
        })?;
        let request = row.into_request().map_err(|source| BatchError::Invalid {
            path: path.to_path_buf(),
            record,
            source,
        })?;
        requests.push(request);
    }

    info!(path = %path.display(), reservations = requests.len(), "read reservation batch");
    Ok(requests)
}
