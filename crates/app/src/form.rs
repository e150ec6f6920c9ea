use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use requerimiento_api::{RegistroClient, RegistroError, RegistroReceipt};
use requerimiento_core::{
    validate, AudioAttachment, AudioError, Coordinates, Requerimiento, ValidationError,
};

use crate::location::{LocationError, LocationProvider};

/// Failure of a form operation.
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Registro(#[from] RegistroError),
}

impl FormError {
    /// Message to show the person filling in the form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Registro(err) => err.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

/// The single in-memory request form and its submission state.
///
/// `submit` borrows the form mutably, so a submission can never overlap
/// another one; `is_submitting` mirrors the disabled submit button.
pub struct RequerimientoForm<L> {
    draft: Requerimiento,
    audio: Option<AudioAttachment>,
    error: Option<String>,
    location_error: Option<LocationError>,
    result_rid: Option<String>,
    submitting: bool,
    location: L,
    client: RegistroClient,
}

impl<L: LocationProvider> RequerimientoForm<L> {
    pub fn new(draft: Requerimiento, location: L, client: RegistroClient) -> Self {
        Self {
            draft,
            audio: None,
            error: None,
            location_error: None,
            result_rid: None,
            submitting: false,
            location,
            client,
        }
    }

    pub fn draft(&self) -> &Requerimiento {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut Requerimiento {
        &mut self.draft
    }

    pub fn toggle_agency(&mut self, agency: &str) -> bool {
        self.draft.toggle_agency(agency)
    }

    pub fn audio(&self) -> Option<&AudioAttachment> {
        self.audio.as_ref()
    }

    /// Inline error from the last failed operation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Alert from the last failed location request.
    pub fn location_error(&self) -> Option<&LocationError> {
        self.location_error.as_ref()
    }

    /// Identifier returned by the last successful submission.
    pub fn result_rid(&self) -> Option<&str> {
        self.result_rid.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Submission is possible once the location is known and nothing is in flight.
    pub fn can_submit(&self) -> bool {
        !self.submitting && self.draft.coords.is_some()
    }

    /// Attaches a voice note, rejecting unsupported media types.
    ///
    /// A rejected file leaves any previously attached note in place.
    pub fn attach_audio(
        &mut self,
        file_name: impl Into<String>,
        media_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), FormError> {
        match AudioAttachment::new(file_name, media_type, bytes) {
            Ok(audio) => {
                info!(stage = "form", file = %audio.file_name(), media_type = %audio.media_type(), size_bytes = audio.size_bytes(), "voice note attached");
                self.audio = Some(audio);
                Ok(())
            }
            Err(err) => {
                warn!(stage = "form", %media_type, "voice note rejected");
                self.error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn clear_audio(&mut self) {
        self.audio = None;
    }

    /// Issues one location request and stores the fix on success.
    ///
    /// On failure the alert is kept in [`Self::location_error`] and the
    /// current coordinates are left untouched.
    pub async fn locate(&mut self) -> Result<Coordinates, LocationError> {
        match self.location.current_position().await {
            Ok(coords) => {
                info!(stage = "location", lat = coords.lat, lng = coords.lng, "location resolved");
                self.draft.coords = Some(coords);
                self.location_error = None;
                Ok(coords)
            }
            Err(err) => {
                warn!(stage = "location", reason = err.kind(), error = %err, "location request failed");
                self.location_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Validates and registers the current draft.
    ///
    /// A missing location triggers exactly one new location request; the
    /// caller has to submit again once it resolves. On success every field
    /// except `vid` and the coordinates is cleared. On failure the draft is
    /// left as it was.
    pub async fn submit(&mut self) -> Result<RegistroReceipt, FormError> {
        let payload = match validate(&self.draft) {
            Ok(payload) => payload,
            Err(err) => {
                counter!("registro_submissions_total", "result" => err.kind()).increment(1);
                warn!(stage = "form", vid = %self.draft.vid, reason = err.kind(), "submission blocked by validation");
                self.error = Some(err.to_string());
                if matches!(err, ValidationError::CoordinatesPending) {
                    let _ = self.locate().await;
                }
                return Err(err.into());
            }
        };

        self.error = None;
        self.result_rid = None;

        let outcome = {
            let _in_flight = InFlight::enter(&mut self.submitting);
            self.client.register(&payload, self.audio.as_ref()).await
        };

        match outcome {
            Ok(receipt) => {
                counter!("registro_submissions_total", "result" => "registered").increment(1);
                info!(stage = "form", vid = %payload.vid(), rid = %receipt.rid, with_audio = self.audio.is_some(), "requerimiento registered");
                self.result_rid = Some(receipt.rid.clone());
                self.draft.reset_after_submission();
                self.audio = None;
                Ok(receipt)
            }
            Err(err) => {
                counter!("registro_submissions_total", "result" => err.kind()).increment(1);
                warn!(stage = "form", vid = %payload.vid(), error = %err, "requerimiento registration failed");
                self.error = Some(err.user_message().to_string());
                Err(err.into())
            }
        }
    }
}

/// Holds the submitting flag for the lifetime of one request, including
/// when the pending future is dropped.
struct InFlight<'a>(&'a mut bool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FixedLocation, NoLocation};
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use reqwest::Client;
    use serde_json::json;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };
    use url::Url;

    const HERE: Coordinates = Coordinates {
        lat: 3.4516,
        lng: -76.532,
    };

    struct CountingLocation {
        calls: Arc<AtomicUsize>,
        result: Result<Coordinates, LocationError>,
    }

    #[async_trait]
    impl LocationProvider for CountingLocation {
        async fn current_position(&self) -> Result<Coordinates, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn filled_draft() -> Requerimiento {
        Requerimiento {
            vid: "VID-1".into(),
            requesting_office: "Secretaría de Salud".into(),
            contact_name: "Juan Pérez".into(),
            description: "Solicitud de fumigación en zona verde".into(),
            observations: "Presencia de mosquitos en el parque".into(),
            address: "Carrera 10 # 25-30".into(),
            neighborhood: "El Poblado".into(),
            district: "Comuna 5".into(),
            phone: "+57 310 9876543".into(),
            email: "juan.perez@example.com".into(),
            agencies: vec!["DAGMA".into(), "Alcaldía Municipal".into()],
            coords: Some(HERE),
        }
    }

    fn client(server: &MockServer) -> RegistroClient {
        let base = Url::parse(&server.url("/")).expect("url");
        RegistroClient::new(base, Client::builder().build().expect("client"))
    }

    #[tokio::test]
    async fn successful_submission_resets_all_but_visit_and_coordinates() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/registrar-requerimiento");
                then.status(200).json_body(json!({ "rid": "X" }));
            })
            .await;

        let mut form = RequerimientoForm::new(filled_draft(), NoLocation, client(&server));
        form.attach_audio("nota.ogg", "audio/ogg", b"ogg".to_vec())
            .expect("ogg accepted");

        let receipt = form.submit().await.expect("submission succeeds");
        mock.assert_async().await;

        assert_eq!(receipt.rid, "X");
        assert_eq!(form.result_rid(), Some("X"));
        assert_eq!(form.error(), None);
        assert!(form.audio().is_none());
        assert!(!form.is_submitting());

        let mut expected = Requerimiento::for_visit("VID-1");
        expected.coords = Some(HERE);
        assert_eq!(form.draft(), &expected);
    }

    #[tokio::test]
    async fn rejected_submission_keeps_fields_and_surfaces_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/registrar-requerimiento");
                then.status(400).json_body(json!({ "detail": "bad input" }));
            })
            .await;

        let mut form = RequerimientoForm::new(filled_draft(), NoLocation, client(&server));
        let err = form.submit().await.expect_err("server rejects");

        assert_eq!(err.user_message(), "bad input");
        assert_eq!(form.error(), Some("bad input"));
        assert_eq!(form.result_rid(), None);
        assert_eq!(form.draft(), &filled_draft());
    }

    #[tokio::test]
    async fn transport_failure_keeps_fields_with_connectivity_message() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let base = Url::parse(&format!("http://{addr}/")).expect("url");
        let client = RegistroClient::new(base, Client::builder().build().expect("client"));
        let mut form = RequerimientoForm::new(filled_draft(), NoLocation, client);

        form.submit().await.expect_err("connection fails");
        assert_eq!(form.error(), Some("Error de conexión con el servidor"));
        assert_eq!(form.draft(), &filled_draft());
    }

    #[tokio::test]
    async fn missing_field_blocks_without_network_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/registrar-requerimiento");
                then.status(200).json_body(json!({ "rid": "X" }));
            })
            .await;

        let mut draft = filled_draft();
        draft.address.clear();
        let mut form = RequerimientoForm::new(draft, NoLocation, client(&server));

        let err = form.submit().await.expect_err("validation fails");
        assert!(matches!(
            err,
            FormError::Validation(ValidationError::MissingFields { .. })
        ));
        assert_eq!(
            form.error(),
            Some("Por favor, completa todos los campos requeridos")
        );
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn pending_location_retriggers_one_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/registrar-requerimiento");
                then.status(200).json_body(json!({ "rid": "X" }));
            })
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingLocation {
            calls: calls.clone(),
            result: Ok(HERE),
        };
        let mut draft = filled_draft();
        draft.coords = None;
        let mut form = RequerimientoForm::new(draft, provider, client(&server));
        assert!(!form.can_submit());

        let err = form.submit().await.expect_err("location pending");
        assert!(matches!(
            err,
            FormError::Validation(ValidationError::CoordinatesPending)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            form.error(),
            Some("Esperando ubicación GPS. Por favor, permite el acceso a tu ubicación.")
        );
        mock.assert_hits_async(0).await;

        assert!(form.can_submit());
        form.submit().await.expect("second attempt succeeds");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn denied_location_keeps_submission_blocked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingLocation {
            calls: calls.clone(),
            result: Err(LocationError::PermissionDenied),
        };
        let server = MockServer::start_async().await;
        let mut draft = filled_draft();
        draft.coords = None;
        let mut form = RequerimientoForm::new(draft, provider, client(&server));

        form.locate().await.expect_err("permission denied");
        form.submit().await.expect_err("still blocked");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(form.location_error(), Some(&LocationError::PermissionDenied));
        assert_eq!(form.draft().coords, None);
        assert!(!form.can_submit());
    }

    #[tokio::test]
    async fn rejected_audio_is_not_attached() {
        let server = MockServer::start_async().await;
        let mut form = RequerimientoForm::new(
            filled_draft(),
            FixedLocation(HERE),
            client(&server),
        );
        form.attach_audio("nota.mp3", "audio/mpeg", b"mp3".to_vec())
            .expect("mp3 accepted");

        let err = form
            .attach_audio("video.mp4", "video/mp4", b"mp4".to_vec())
            .expect_err("video rejected");

        assert!(matches!(err, FormError::Audio(_)));
        assert_eq!(
            form.audio().map(|audio| audio.file_name()),
            Some("nota.mp3")
        );
    }

    #[tokio::test]
    async fn dropped_submission_clears_in_flight_flag() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/registrar-requerimiento");
                then.status(200)
                    .delay(Duration::from_secs(5))
                    .json_body(json!({ "rid": "late" }));
            })
            .await;

        let mut form = RequerimientoForm::new(filled_draft(), NoLocation, client(&server));
        let abandoned = tokio::time::timeout(Duration::from_millis(100), form.submit()).await;

        assert!(abandoned.is_err());
        assert!(!form.is_submitting());
        assert!(form.can_submit());
        assert_eq!(form.draft(), &filled_draft());
    }

    #[tokio::test]
    async fn unavailable_position_leaves_coordinates_unset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingLocation {
            calls: calls.clone(),
            result: Err(LocationError::Unavailable),
        };
        let server = MockServer::start_async().await;
        let mut draft = filled_draft();
        draft.coords = None;
        let mut form = RequerimientoForm::new(draft, provider, client(&server));

        let err = form.locate().await.expect_err("position unavailable");

        assert_eq!(err, LocationError::Unavailable);
        assert_eq!(form.location_error(), Some(&LocationError::Unavailable));
        assert_eq!(
            form.location_error().map(ToString::to_string).as_deref(),
            Some("No se pudo obtener la ubicación GPS. Por favor, habilita los permisos de ubicación.")
        );
        assert_eq!(form.draft().coords, None);
        assert!(!form.can_submit());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
