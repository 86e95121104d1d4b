use crate::domain::model::StagedStudy;
use crate::utils::error::{CourierError, Result};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

pub const IMAGING_EXTENSION: &str = "dcm";
pub const COMPANION_EXTENSION: &str = "csv";
/// Modality of the structural record that carries study-level identity.
pub const STRUCTURAL_MODALITY: &str = "RTSTRUCT";

fn dicom_error(path: &Path, error: impl std::fmt::Display) -> CourierError {
    CourierError::Dicom {
        message: format!("{}: {}", path.display(), error),
    }
}

fn element_str(obj: &DefaultDicomObject, path: &Path, tag: Tag) -> Result<Option<String>> {
    match obj.element_opt(tag).map_err(|e| dicom_error(path, e))? {
        Some(element) => {
            let value = element.to_str().map_err(|e| dicom_error(path, e))?;
            Ok(Some(value.trim().to_string()))
        }
        None => Ok(None),
    }
}

fn require_element_str(obj: &DefaultDicomObject, path: &Path, tag: Tag) -> Result<String> {
    element_str(obj, path, tag)?
        .ok_or_else(|| dicom_error(path, format!("missing attribute {}", tag)))
}

/// One pass over the job folder in sorted filename order: write a tagged copy
/// of every imaging file into a fresh staging workspace, set the companion
/// candidate aside, and capture the session identity from the structural
/// record. Source files are never modified, so a failed job can be redelivered
/// and replayed as-is.
///
/// Fails before any network call: `UnknownPatient` on a patient id missing
/// from the site mapping, `EmptyStudy` on a folder without imaging files,
/// `MissingSessionIdentity` when no structural record is present.
pub fn stage_study(folder: &Path, sites: &HashMap<String, String>) -> Result<StagedStudy> {
    let mut entries: Vec<_> = std::fs::read_dir(folder)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let workspace = TempDir::with_prefix("xnat-courier-")?;
    let mut imaging = Vec::new();
    let mut companion = None;
    let mut site_code: Option<String> = None;
    let mut structural: Option<(String, String)> = None;

    for path in entries {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some(COMPANION_EXTENSION) => {
                if companion.is_none() {
                    tracing::info!("Companion file found: {}", path.display());
                    companion = Some(path);
                } else {
                    tracing::warn!(
                        "Ignoring extra companion candidate: {}",
                        path.display()
                    );
                }
            }
            Some(IMAGING_EXTENSION) => {
                let mut obj = dicom_object::open_file(&path).map_err(|e| dicom_error(&path, e))?;

                let patient_id = require_element_str(&obj, &path, tags::PATIENT_ID)?;
                let site = sites.get(&patient_id).ok_or_else(|| {
                    CourierError::UnknownPatient {
                        patient_id: patient_id.clone(),
                    }
                })?;

                obj.put(DataElement::new(
                    tags::BODY_PART_EXAMINED,
                    VR::CS,
                    PrimitiveValue::from(site.as_str()),
                ));

                if site_code.is_none() {
                    site_code = Some(site.clone());
                }

                if let Some(modality) = element_str(&obj, &path, tags::MODALITY)? {
                    if modality == STRUCTURAL_MODALITY {
                        if structural.is_some() {
                            tracing::warn!(
                                "Multiple structural records in {}, keeping the last one",
                                folder.display()
                            );
                        }
                        let subject = require_element_str(&obj, &path, tags::PATIENT_NAME)?;
                        structural = Some((subject, patient_id));
                    }
                }

                // file_name is present, the path came from read_dir
                let staged = workspace.path().join(path.file_name().unwrap());
                obj.write_to_file(&staged)
                    .map_err(|e| dicom_error(&staged, e))?;
                imaging.push(staged);
            }
            _ => {
                tracing::debug!("Skipping non-study file: {}", path.display());
            }
        }
    }

    let site_code = site_code.ok_or_else(|| CourierError::EmptyStudy {
        folder: folder.display().to_string(),
    })?;
    let (subject, experiment) = structural.ok_or_else(|| CourierError::MissingSessionIdentity {
        folder: folder.display().to_string(),
    })?;

    tracing::info!(
        "Staged {} imaging file(s) for site {} (subject {}, experiment {})",
        imaging.len(),
        site_code,
        subject,
        experiment,
    );

    Ok(StagedStudy {
        workspace,
        imaging,
        companion,
        site_code,
        subject,
        experiment,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::{tags, uids};
    use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
    use std::path::Path;

    pub(crate) fn write_dicom(
        dir: &Path,
        name: &str,
        patient_id: &str,
        patient_name: &str,
        modality: &str,
    ) {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
        ));
        obj.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.840.10008.99.1"),
        ));
        obj.put(DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from(patient_id),
        ));
        obj.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from(patient_name),
        ));
        obj.put(DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from(modality),
        ));

        let file_obj = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid("1.2.840.10008.99.1")
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
            )
            .unwrap();
        file_obj.write_to_file(dir.join(name)).unwrap();
    }
}
