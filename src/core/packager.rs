use crate::domain::model::StagedStudy;
use crate::utils::error::{CourierError, Result};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// Bundle the staged imaging copies into one in-memory zip, flat arcnames,
/// companion excluded. The bytes are handed to the import call and dropped
/// afterwards whatever the outcome.
pub fn build_package(study: &StagedStudy) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    for path in &study.imaging {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| CourierError::Dicom {
                message: format!("unrepresentable file name: {}", path.display()),
            })?;

        zip.start_file::<_, ()>(name, FileOptions::default())?;
        let data = std::fs::read(path)?;
        zip.write_all(&data)?;
    }

    let cursor = zip.finish()?;
    let package = cursor.into_inner();

    tracing::debug!(
        "Built upload package: {} entries, {} bytes",
        study.imaging.len(),
        package.len()
    );

    Ok(package)
}
