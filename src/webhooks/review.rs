//! Admission review envelope handling.

use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::{DynamicObject, TypeMeta};
use thiserror::Error;

/// API group of the admission review envelope
pub const ADMISSION_GROUP: &str = "admission.k8s.io";

/// Envelope versions the dispatcher accepts and echoes back
pub const SUPPORTED_ADMISSION_VERSIONS: [&str; 2] = ["v1", "v1beta1"];

const REVIEW_KIND: &str = "AdmissionReview";

/// Reasons an incoming body is not a usable admission review
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("malformed admission review: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported admission review apiVersion '{0}'")]
    UnsupportedVersion(String),

    #[error("admission review carries no request")]
    MissingRequest,
}

/// A decoded admission review, remembering the envelope version it arrived in.
#[derive(Debug)]
pub struct AdmissionExchange {
    api_version: String,
    request: AdmissionRequest<DynamicObject>,
}

impl AdmissionExchange {
    /// Decode a request body.
    pub fn decode(body: &[u8]) -> Result<Self, ReviewError> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body)?;
        let api_version = review.types.api_version.clone();

        let supported = api_version
            .split_once('/')
            .is_some_and(|(group, version)| {
                group == ADMISSION_GROUP && SUPPORTED_ADMISSION_VERSIONS.contains(&version)
            });
        if !supported {
            return Err(ReviewError::UnsupportedVersion(api_version));
        }

        let request: AdmissionRequest<DynamicObject> = review
            .try_into()
            .map_err(|_| ReviewError::MissingRequest)?;

        Ok(Self {
            api_version,
            request,
        })
    }

    /// Full envelope apiVersion, e.g. `admission.k8s.io/v1beta1`
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Version part of the envelope apiVersion
    pub fn version(&self) -> &str {
        self.api_version
            .split_once('/')
            .map_or(self.api_version.as_str(), |(_, version)| version)
    }

    pub fn uid(&self) -> &str {
        &self.request.uid
    }

    pub fn request(&self) -> &AdmissionRequest<DynamicObject> {
        &self.request
    }

    /// Wrap a handler's response in an envelope matching the request's
    /// version and uid.
    pub fn respond(&self, mut response: AdmissionResponse) -> AdmissionReview<DynamicObject> {
        response.uid = self.request.uid.clone();
        let mut review = response.into_review();
        review.types = TypeMeta {
            api_version: self.api_version.clone(),
            kind: REVIEW_KIND.to_string(),
        };
        review
    }
}
