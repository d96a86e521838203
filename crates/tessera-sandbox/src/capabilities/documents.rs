use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tessera_core::Uri;
use tessera_events::Emitter;
use tracing::debug;

use crate::capabilities::ExtHostFileSystem;
use crate::error::{SandboxError, SandboxResult};

/// An opened text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    uri: Uri,
    text: String,
    version: u32,
}

impl TextDocument {
    /// Document URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Full text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Version, starting at 1.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of lines. An empty document has one line.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Line `index` without its terminator.
    #[must_use]
    pub fn line_at(&self, index: usize) -> Option<&str> {
        self.text
            .split('\n')
            .nth(index)
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
    }
}

/// Documents opened by the sandbox, read through the host filesystem.
pub struct ExtHostDocuments {
    fs: Arc<ExtHostFileSystem>,
    documents: RwLock<HashMap<Uri, Arc<TextDocument>>>,
    opened: Emitter<Uri>,
}

impl ExtHostDocuments {
    /// Create an empty document set over `fs`.
    #[must_use]
    pub fn new(fs: Arc<ExtHostFileSystem>) -> Self {
        Self {
            fs,
            documents: RwLock::new(HashMap::new()),
            opened: Emitter::new(),
        }
    }

    fn cached(&self, uri: &Uri) -> Option<Arc<TextDocument>> {
        match self.documents.read() {
            Ok(documents) => documents.get(uri).cloned(),
            Err(poisoned) => poisoned.into_inner().get(uri).cloned(),
        }
    }

    /// Open `uri` as UTF-8 text. Already-open documents are returned as is.
    ///
    /// # Errors
    ///
    /// Returns the filesystem error, or [`SandboxError::InvalidDocument`]
    /// for non-UTF-8 content.
    pub async fn open_text_document(&self, uri: &Uri) -> SandboxResult<Arc<TextDocument>> {
        if let Some(document) = self.cached(uri) {
            return Ok(document);
        }

        let bytes = self.fs.read_file(uri).await?;
        let text = String::from_utf8(bytes).map_err(|e| SandboxError::InvalidDocument {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        let (document, fresh) = {
            let mut documents = match self.documents.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match documents.get(uri) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let document = Arc::new(TextDocument {
                        uri: uri.clone(),
                        text,
                        version: 1,
                    });
                    documents.insert(uri.clone(), Arc::clone(&document));
                    (document, true)
                },
            }
        };
        if fresh {
            debug!(uri = %uri, "Text document opened");
            self.opened.fire(uri.clone());
        }
        Ok(document)
    }

    /// Forget an open document. Returns `true` if it was open.
    pub fn close(&self, uri: &Uri) -> bool {
        let mut documents = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        documents.remove(uri).is_some()
    }

    /// Open documents, ordered by URI.
    #[must_use]
    pub fn text_documents(&self) -> Vec<Arc<TextDocument>> {
        let mut documents: Vec<Arc<TextDocument>> = match self.documents.read() {
            Ok(documents) => documents.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        documents.sort_by(|a, b| a.uri.cmp(&b.uri));
        documents
    }

    /// Fires the URI of each newly opened document.
    #[must_use]
    pub fn on_did_open(&self) -> &Emitter<Uri> {
        &self.opened
    }
}

impl std::fmt::Debug for ExtHostDocuments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtHostDocuments")
            .field("open", &self.text_documents().len())
            .finish_non_exhaustive()
    }
}
