//! Represents the metadata stored next to an object's payload.

/// The four metadata facts read back for a stored object.
///
/// Each fact lives in its own sidecar entry inside the object directory:
/// strings carry their value as the entry's byte content, booleans are
/// encoded by the entry's mere presence.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Original client-supplied filename. Only ever used to suggest a name
    /// in the download disposition header, never as a path component.
    pub filename: String,

    /// MIME type declared by the uploading multipart part.
    pub content_type: String,

    /// Remove the object right after it has been served to a non-bot client.
    pub auto_delete: bool,

    /// Force downloads to an opaque attachment instead of an inline,
    /// type-sniffed response.
    pub header_download: bool,
}
