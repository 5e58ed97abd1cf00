use std::fs;
use std::path::Path;

use crate::models::message::ThreadMessage;
use crate::service::AgentsService;
use crate::session::OutputSink;

/// Retrieve the generated files referenced by a completed message and save
/// them locally. The remote copies are transient outputs of this run, so
/// each one is deleted after a successful download; uploaded input assets
/// never travel through this path. Failures are reported to the sink and do
/// not fail the turn.
pub async fn save_generated_files(
    service: &dyn AgentsService,
    message: &ThreadMessage,
    dir: &Path,
    sink: &mut dyn OutputSink,
) {
    let annotations = message.file_path_annotations();
    let images = message.image_file_ids();

    for (index, &file_id) in images.iter().enumerate() {
        let attachment = annotations.get(index).map(|(text, _)| *text);
        fetch_one(service, file_id, attachment, ".png", dir, sink).await;
    }

    // Annotated non-image files (data exports and the like).
    for &(text, file_id) in &annotations {
        if !images.contains(&file_id) {
            fetch_one(service, file_id, Some(text), "", dir, sink).await;
        }
    }
}

async fn fetch_one(
    service: &dyn AgentsService,
    file_id: &str,
    attachment: Option<&str>,
    default_extension: &str,
    dir: &Path,
    sink: &mut dyn OutputSink,
) {
    sink.notice(&format!("Getting file with ID: {file_id}"));

    let content = match service.get_file_content(file_id).await {
        Ok(content) => content,
        Err(e) => {
            sink.error(&format!("Failed to retrieve file {file_id}: {e}"));
            return;
        }
    };

    let path = dir.join(local_file_name(attachment, file_id, default_extension));
    let written = fs::create_dir_all(dir).and_then(|_| fs::write(&path, content));
    if let Err(e) = written {
        sink.error(&format!("Failed to save {}: {e}", path.display()));
        return;
    }
    sink.notice(&format!("File saved to {}", path.display()));

    if let Err(e) = service.delete_file(file_id).await {
        tracing::warn!(file_id, error = %e, "failed to delete remote file");
    }
}

/// Local name for a downloaded file: the annotated name's stem, the file id
/// to keep repeated downloads distinct, and the original extension (or the
/// default when the annotation carries none).
fn local_file_name(attachment: Option<&str>, file_id: &str, default_extension: &str) -> String {
    let attachment = attachment.unwrap_or("unknown");
    let base = attachment.rsplit([':', '/']).next().unwrap_or(attachment);
    let (stem, extension) = match base.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, format!(".{extension}")),
        _ => (base, default_extension.to_string()),
    };
    format!("{stem}.{file_id}{extension}")
}
