//! Positional grouping of recognized pages into forms.
//!
//! A printed intake form has a fixed page count, so pages are chunked by
//! position rather than by content: OCR text is too noisy to find form
//! boundaries reliably. A short final group is kept so a lost page never
//! drops a whole patient.

use std::num::NonZeroUsize;

use crate::pipeline::types::{Form, RecognizedPage};

/// Pages per malaria investigation form.
pub const DEFAULT_GROUP_SIZE: usize = 4;

/// Split `pages` into consecutive forms of `group_size` pages, in order.
/// The last form holds the remainder when the count is not a multiple.
pub fn group_pages(pages: Vec<RecognizedPage>, group_size: NonZeroUsize) -> Vec<Form> {
    let size = group_size.get();
    let mut forms = Vec::with_capacity(pages.len().div_ceil(size));
    let mut pages = pages.into_iter().peekable();

    while pages.peek().is_some() {
        let chunk: Vec<RecognizedPage> = pages.by_ref().take(size).collect();
        forms.push(Form {
            index: forms.len() + 1,
            pages: chunk,
        });
    }

    if let Some(last) = forms.last() {
        if last.pages.len() < size {
            tracing::warn!(
                form = last.index,
                pages = last.pages.len(),
                expected = size,
                "Final form is short; page count is not a multiple of the group size"
            );
        }
    }

    forms
}
