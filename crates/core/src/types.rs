use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Agencies offered by the request form, in display order.
pub const AVAILABLE_AGENCIES: &[&str] = &[
    "DAGMA",
    "Secretaría de Obras Públicas",
    "Planeación Municipal",
    "Secretaría de Salud",
    "Alcaldía Municipal",
    "EMCALI",
    "Bomberos",
];

/// A resolved device location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` when both components are finite and inside WGS84 bounds.
    pub fn is_within_range(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// JSON text sent in the `coords` multipart field.
    pub fn to_json_text(&self) -> String {
        json!({ "lat": self.lat, "lng": self.lng }).to_string()
    }
}

/// Citizen-service request as edited on the form.
///
/// Field names on the wire (and in JSON documents loaded by the CLI) follow
/// the registration endpoint. Coordinates are either fully resolved or absent;
/// a `{"lat": null, "lng": null}` document deserializes as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requerimiento {
    #[serde(default)]
    pub vid: String,
    #[serde(rename = "centro_gestor_solicitante", default)]
    pub requesting_office: String,
    #[serde(rename = "solicitante_contacto", default)]
    pub contact_name: String,
    #[serde(rename = "requerimiento", default)]
    pub description: String,
    #[serde(rename = "observaciones", default)]
    pub observations: String,
    #[serde(rename = "direccion", default)]
    pub address: String,
    #[serde(rename = "barrio_vereda", default)]
    pub neighborhood: String,
    #[serde(rename = "comuna_corregimiento", default)]
    pub district: String,
    #[serde(rename = "telefono", default)]
    pub phone: String,
    #[serde(rename = "email_solicitante", default)]
    pub email: String,
    #[serde(rename = "organismos_encargados", default)]
    pub agencies: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_partial_coords")]
    pub coords: Option<Coordinates>,
}

impl Requerimiento {
    /// Creates an empty draft bound to a visit identifier.
    pub fn for_visit(vid: impl Into<String>) -> Self {
        Self {
            vid: vid.into(),
            ..Self::default()
        }
    }

    /// Text fields keyed by their wire name, in submission order.
    pub fn text_fields(&self) -> [(&'static str, &str); 10] {
        [
            ("vid", &self.vid),
            ("centro_gestor_solicitante", &self.requesting_office),
            ("solicitante_contacto", &self.contact_name),
            ("requerimiento", &self.description),
            ("observaciones", &self.observations),
            ("direccion", &self.address),
            ("barrio_vereda", &self.neighborhood),
            ("comuna_corregimiento", &self.district),
            ("telefono", &self.phone),
            ("email_solicitante", &self.email),
        ]
    }

    /// Adds the agency when it is not selected yet, removes it otherwise.
    ///
    /// Returns `true` when the agency ends up selected.
    pub fn toggle_agency(&mut self, agency: &str) -> bool {
        if let Some(index) = self.agencies.iter().position(|value| value == agency) {
            self.agencies.remove(index);
            false
        } else {
            self.agencies.push(agency.to_string());
            true
        }
    }

    /// Clears everything except the visit identifier and the location fix.
    pub fn reset_after_submission(&mut self) {
        *self = Self {
            vid: std::mem::take(&mut self.vid),
            coords: self.coords,
            ..Self::default()
        };
    }
}

#[derive(Deserialize)]
struct PartialCoords {
    lat: Option<f64>,
    lng: Option<f64>,
}

fn deserialize_partial_coords<'de, D>(deserializer: D) -> Result<Option<Coordinates>, D::Error>
where
    D: Deserializer<'de>,
{
    let partial = Option::<PartialCoords>::deserialize(deserializer)?;
    Ok(partial.and_then(|coords| match (coords.lat, coords.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
        _ => None,
    }))
}

/// A request that passed validation and is ready to be sent.
///
/// Only [`crate::validate`] constructs this type.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistroPayload {
    record: Requerimiento,
    coords: Coordinates,
}

impl RegistroPayload {
    pub(crate) fn new(record: Requerimiento, coords: Coordinates) -> Self {
        Self { record, coords }
    }

    pub fn vid(&self) -> &str {
        &self.record.vid
    }

    pub fn coords(&self) -> Coordinates {
        self.coords
    }

    /// Multipart text parts in the order the endpoint documents them.
    ///
    /// `coords` and `organismos_encargados` are embedded JSON text.
    pub fn text_parts(&self) -> Vec<(&'static str, String)> {
        let fields = self.record.text_fields();
        let mut parts: Vec<(&'static str, String)> = Vec::with_capacity(12);
        for (name, value) in &fields[..8] {
            parts.push((*name, value.to_string()));
        }
        parts.push(("coords", self.coords.to_json_text()));
        for (name, value) in &fields[8..] {
            parts.push((*name, value.to_string()));
        }
        parts.push((
            "organismos_encargados",
            Value::from(self.record.agencies.clone()).to_string(),
        ));
        parts
    }
}
