use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{clean_optional, text_enum, Pagination};
use crate::error::{AppError, Result};

text_enum! {
    pub enum ServiceCategory ("Categoria") {
        Consulenza => "consulenza",
        Formazione => "formazione",
        ValutazioneRischi => "valutazione_rischi",
        MonitoraggioAmbientale => "monitoraggio_ambientale",
        SicurezzaLavoro => "sicurezza_lavoro",
        Certificazioni => "certificazioni",
        MedicinaLavoro => "medicina_lavoro",
        Antincendio => "antincendio",
        Altro => "altro",
    }
}

text_enum! {
    pub enum PricingUnit ("Unità di prezzo") {
        Fixed => "fixed",
        Hourly => "hourly",
        Daily => "daily",
        PerParticipant => "per_participant",
    }
}

text_enum! {
    pub enum LocationType ("Modalità di erogazione") {
        OnSite => "on_site",
        Remote => "remote",
        ProviderLocation => "provider_location",
        Flexible => "flexible",
    }
}

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub pricing_unit: String,
    pub base_price: f64,
    pub location_type: String,
    pub duration_hours: Option<f64>,
    pub max_participants: Option<i32>,
    pub service_areas: Vec<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn pricing(&self) -> Result<PricingUnit> {
        self.pricing_unit.parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: ServiceCategory,
    pub pricing_unit: PricingUnit,
    pub base_price: f64,
    pub location_type: LocationType,
    pub duration_hours: Option<f64>,
    pub max_participants: Option<i32>,
    #[serde(default)]
    pub service_areas: Vec<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

impl CreateServiceRequest {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_description(self.description.as_deref())?;
        validate_price(self.base_price)?;
        validate_duration(self.duration_hours)?;
        validate_max_participants(self.max_participants)?;
        Ok(())
    }

    pub fn normalized_areas(&self) -> Vec<String> {
        normalize_areas(&self.service_areas)
    }

    pub fn description(&self) -> Option<String> {
        clean_optional(self.description.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateServiceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<ServiceCategory>,
    pub pricing_unit: Option<PricingUnit>,
    pub base_price: Option<f64>,
    pub location_type: Option<LocationType>,
    pub duration_hours: Option<f64>,
    pub max_participants: Option<i32>,
    pub service_areas: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateServiceRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        validate_description(self.description.as_deref())?;
        if let Some(price) = self.base_price {
            validate_price(price)?;
        }
        validate_duration(self.duration_hours)?;
        validate_max_participants(self.max_participants)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub category: Option<ServiceCategory>,
    pub provider_id: Option<Uuid>,
    /// Matched against title and description.
    pub q: Option<String>,
    /// Matched against the provider's service areas.
    pub area: Option<String>,
    pub location_type: Option<LocationType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub include_inactive: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ServiceQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }
}

fn validate_title(title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Il titolo è obbligatorio".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Il titolo supera i {MAX_TITLE_LEN} caratteri"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(AppError::Validation(format!(
            "La descrizione supera i {MAX_DESCRIPTION_LEN} caratteri"
        )));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(format!("Prezzo non valido: {price}")));
    }
    Ok(())
}

fn validate_duration(hours: Option<f64>) -> Result<()> {
    match hours {
        Some(h) if !h.is_finite() || h <= 0.0 => Err(AppError::Validation(format!("Durata non valida: {h}"))),
        _ => Ok(()),
    }
}

fn validate_max_participants(max: Option<i32>) -> Result<()> {
    match max {
        Some(n) if n < 1 => Err(AppError::Validation(
            "Il numero massimo di partecipanti deve essere almeno 1".into(),
        )),
        _ => Ok(()),
    }
}

/// Trimmed, de-duplicated (case-insensitive) area names in input order.
pub fn normalize_areas(areas: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for area in areas {
        let area = area.trim();
        if !area.is_empty() && !out.iter().any(|seen| seen.eq_ignore_ascii_case(area)) {
            out.push(area.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateServiceRequest {
        serde_json::from_str(
            r#"{
                "title": "Corso antincendio rischio medio",
                "category": "antincendio",
                "pricing_unit": "per_participant",
                "base_price": 120.0,
                "location_type": "on_site",
                "max_participants": 20,
                "service_areas": ["Milano", " milano ", "Monza", ""]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_and_validates_a_service() {
        let req = request();
        assert!(req.validate().is_ok());
        assert_eq!(req.category, ServiceCategory::Antincendio);
        assert_eq!(req.pricing_unit, PricingUnit::PerParticipant);
        assert_eq!(req.normalized_areas(), vec!["Milano".to_string(), "Monza".to_string()]);
    }

    #[test]
    fn rejects_unknown_category() {
        let err = serde_json::from_str::<CreateServiceRequest>(
            r#"{"title":"x","category":"pulizie","pricing_unit":"fixed","base_price":1,"location_type":"remote"}"#,
        );
        assert!(err.is_err());
        assert!("pulizie".parse::<ServiceCategory>().is_err());
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut req = request();
        req.base_price = -1.0;
        assert!(req.validate().is_err());

        let mut req = request();
        req.max_participants = Some(0);
        assert!(req.validate().is_err());

        let mut req = request();
        req.duration_hours = Some(f64::NAN);
        assert!(req.validate().is_err());

        let mut req = request();
        req.title = "  ".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn all_categories_have_text_forms() {
        assert_eq!(ServiceCategory::ALL.len(), 9);
        assert_eq!(ServiceCategory::ValutazioneRischi.to_string(), "valutazione_rischi");
        assert_eq!("medicina_lavoro".parse::<ServiceCategory>().unwrap(), ServiceCategory::MedicinaLavoro);
    }
}
