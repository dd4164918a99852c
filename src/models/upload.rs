use garde::Validate;
use serde::Serialize;

use crate::models::menu::RecognitionHints;

/// Text fields of a menu upload (the image part is handled separately).
#[derive(Debug, Default, Validate)]
pub struct UploadForm {
    #[garde(range(min = 1))]
    pub restaurant_id: Option<i64>,

    #[garde(length(min = 1, max = 100))]
    pub location: Option<String>,
}

impl UploadForm {
    pub fn hints(&self) -> RecognitionHints {
        RecognitionHints {
            restaurant_id: self.restaurant_id,
            location: self.location.clone(),
        }
    }
}

/// Response after submitting a menu photo for recognition.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_id: String,
    pub status: String,
    pub estimated_time: u64,
}
