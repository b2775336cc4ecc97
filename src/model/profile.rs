use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    geo::{GeoPoint, Locatable},
};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClientProfile {
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub industry_sector: Option<String>,
    pub employees_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub user_id: Uuid,
    pub business_name: Option<String>,
    pub vat_number: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The profile matching a user's type; admins have none.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "profile_type", content = "profile", rename_all = "snake_case")]
pub enum Profile {
    Client(ClientProfile),
    Provider(ProviderProfile),
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateClientProfileRequest {
    pub company_name: Option<String>,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub industry_sector: Option<String>,
    pub employees_count: Option<i32>,
}

impl UpdateClientProfileRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(vat) = &self.vat_number {
            validate_vat_number(vat)?;
        }
        if let Some(province) = &self.province {
            validate_province(province)?;
        }
        if let Some(postal_code) = &self.postal_code {
            validate_postal_code(postal_code)?;
        }
        if self.employees_count.is_some_and(|n| n < 0) {
            return Err(AppError::Validation("Il numero di dipendenti non può essere negativo".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProviderProfileRequest {
    pub business_name: Option<String>,
    pub vat_number: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
}

impl UpdateProviderProfileRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(vat) = &self.vat_number {
            validate_vat_number(vat)?;
        }
        if let Some(province) = &self.province {
            validate_province(province)?;
        }
        if let Some(postal_code) = &self.postal_code {
            validate_postal_code(postal_code)?;
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                GeoPoint::new(lat, lon)?;
            }
            (None, None) => {}
            _ => {
                return Err(AppError::Validation(
                    "Latitudine e longitudine vanno indicate insieme".into(),
                ))
            }
        }
        if let Some(radius) = self.service_radius_km {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(AppError::Validation(format!("Raggio di servizio non valido: {radius}")));
            }
        }
        Ok(())
    }
}

/// Provider row as listed publicly, with review aggregates.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProviderSummary {
    pub user_id: Uuid,
    pub business_name: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub verified: bool,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

impl Locatable for ProviderSummary {
    fn location(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.latitude?, self.longitude?).ok()
    }
}

/// Italian VAT numbers ("partita IVA") are 11 digits, optionally prefixed with IT.
pub fn validate_vat_number(vat: &str) -> Result<()> {
    let trimmed = vat.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let digits = trimmed.strip_prefix("IT").unwrap_or(trimmed);
    if digits.len() != 11 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("Partita IVA non valida".into()));
    }
    Ok(())
}

fn validate_province(province: &str) -> Result<()> {
    let trimmed = province.trim();
    if trimmed.is_empty() || (trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic())) {
        Ok(())
    } else {
        Err(AppError::Validation("La provincia deve essere una sigla di due lettere".into()))
    }
}

fn validate_postal_code(postal_code: &str) -> Result<()> {
    let trimmed = postal_code.trim();
    if trimmed.is_empty() || (trimmed.len() == 5 && trimmed.chars().all(|c| c.is_ascii_digit())) {
        Ok(())
    } else {
        Err(AppError::Validation("CAP non valido".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vat_numbers() {
        assert!(validate_vat_number("12345678901").is_ok());
        assert!(validate_vat_number("IT12345678901").is_ok());
        assert!(validate_vat_number("").is_ok());
        assert!(validate_vat_number("1234").is_err());
        assert!(validate_vat_number("IT1234567890A").is_err());
    }

    #[test]
    fn provider_coordinates_must_come_in_pairs() {
        let req = UpdateProviderProfileRequest {
            latitude: Some(45.46),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateProviderProfileRequest {
            latitude: Some(45.46),
            longitude: Some(9.19),
            province: Some("MI".into()),
            postal_code: Some("20121".into()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());

        let req = UpdateProviderProfileRequest {
            latitude: Some(95.0),
            longitude: Some(9.19),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn client_profile_rejects_bad_codes() {
        let req = UpdateClientProfileRequest {
            province: Some("Milano".into()),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateClientProfileRequest {
            postal_code: Some("2012".into()),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateClientProfileRequest {
            employees_count: Some(-1),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn providers_without_coordinates_have_no_location() {
        let provider = ProviderSummary {
            user_id: Uuid::nil(),
            business_name: Some("Sicurezza Srl".into()),
            description: None,
            city: None,
            province: None,
            region: None,
            latitude: Some(45.0),
            longitude: None,
            service_radius_km: None,
            verified: false,
            average_rating: None,
            review_count: 0,
        };
        assert!(provider.location().is_none());
    }
}
