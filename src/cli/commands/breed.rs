//! Breed Command
//!
//! Usage:
//!   petpal breed <IMAGE_PATH> [-f json]
//!   petpal breed --data-uri "data:image/png;base64,..." [-f json]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::cli::CommandContext;
use crate::flows::BreedRequest;
use crate::types::{PetPalError, Result};

/// MIME type for an image file extension
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// `data:<mime>;base64,<data>` for raw bytes
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Read an image file into a data URI
///
/// Unknown extensions are encoded as `application/octet-stream`, which the
/// breed flow answers with its invalid-image response.
pub fn load_image(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mime = mime_for(path).unwrap_or("application/octet-stream");
    debug!(path = %path.display(), mime, bytes = bytes.len(), "Encoded image");
    Ok(encode_data_uri(mime, &bytes))
}

pub fn run(ctx: &CommandContext, image: Option<&Path>, data_uri: Option<String>) -> Result<()> {
    let photo_data_uri = match (image, data_uri) {
        (_, Some(uri)) => uri,
        (Some(path), None) => load_image(path)?,
        (None, None) => {
            return Err(PetPalError::Config(
                "Provide an image path or --data-uri".to_string(),
            ));
        }
    };

    let request = BreedRequest { photo_data_uri };
    let result = super::runtime()?.block_on(ctx.petpal.identify_breed(&request))?;

    ctx.report(&result, |out, report| {
        if !report.is_pet_detected {
            out.warning(report.error.as_deref().unwrap_or("No pet detected in the image."));
            return;
        }

        out.header(report.breed_name.as_deref().unwrap_or("Unknown Breed"));
        if let Some(confidence) = report.confidence {
            out.field("Confidence", &format!("{:.0}%", confidence * 100.0));
        }
        if let Some(lifespan) = &report.average_lifespan {
            out.field("Average lifespan", lifespan);
        }
        if let Some(temperament) = &report.temperament {
            out.field("Temperament", temperament);
        }
        if let Some(issues) = report.common_health_issues.as_deref()
            && !issues.is_empty()
        {
            out.section("Common Health Issues");
            out.bullets(issues);
        }
        if let Some(description) = &report.description {
            out.section("About");
            out.paragraph(description);
        }
    })
}
