use crate::domain::DocumentId;

/// Page delimiter in the raw source form: one form feed per page break.
const PAGE_SEPARATOR: u8 = 0x0c;

const DEFAULT_PAGES_PER_PART: u32 = 25;
const MIN_PAGES_PER_PART: u32 = 10;
const MAX_PAGES_PER_PART: u32 = 100;

/// How many pages go into each part. Values outside the supported range are
/// clamped rather than rejected, so operator overrides cannot produce
/// degenerate splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    pages_per_part: u32,
}

impl SplitPolicy {
    pub fn new(pages_per_part: u32) -> Self {
        Self {
            pages_per_part: pages_per_part.clamp(MIN_PAGES_PER_PART, MAX_PAGES_PER_PART),
        }
    }

    pub fn pages_per_part(&self) -> u32 {
        self.pages_per_part
    }
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PAGES_PER_PART)
    }
}

/// One independently convertible slice of the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSlice {
    pub part_number: u32,
    /// 1-based, inclusive.
    pub start_page: u32,
    /// 1-based, inclusive.
    pub end_page: u32,
    pub payload: Vec<u8>,
}

impl PartSlice {
    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }
}

/// Ordered split of one document. Parts are non-overlapping, cover the
/// whole input, and concatenating their payloads in part-number order with
/// the page separator restored reconstructs the source exactly.
#[derive(Debug, Clone)]
pub struct PartPlan {
    pub document_id: DocumentId,
    pub total_pages: u32,
    pub parts: Vec<PartSlice>,
}

impl PartPlan {
    pub fn total_parts(&self) -> u32 {
        self.parts.len() as u32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("document {0} is empty")]
    EmptyDocument(DocumentId),
}

/// Divides raw input into N ordered parts under the page policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Splitter {
    policy: SplitPolicy,
}

impl Splitter {
    pub fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    pub fn split(&self, document_id: DocumentId, content: &[u8]) -> Result<PartPlan, SplitError> {
        self.split_with(document_id, content, self.policy)
    }

    /// Splits with a per-request policy override.
    pub fn split_with(
        &self,
        document_id: DocumentId,
        content: &[u8],
        policy: SplitPolicy,
    ) -> Result<PartPlan, SplitError> {
        if content.is_empty() {
            return Err(SplitError::EmptyDocument(document_id));
        }

        let pages: Vec<&[u8]> = content.split(|b| *b == PAGE_SEPARATOR).collect();
        let total_pages = pages.len() as u32;
        let per_part = policy.pages_per_part();
        let total_parts = total_pages.div_ceil(per_part);

        let mut parts = Vec::with_capacity(total_parts as usize);
        for part_number in 0..total_parts {
            let start = part_number * per_part;
            let end = ((part_number + 1) * per_part).min(total_pages);
            let payload = pages[start as usize..end as usize].join(&PAGE_SEPARATOR);

            parts.push(PartSlice {
                part_number,
                start_page: start + 1,
                end_page: end,
                payload,
            });
        }

        tracing::debug!(
            document_id = %document_id,
            total_pages,
            total_parts,
            pages_per_part = per_part,
            "Split document into parts"
        );

        Ok(PartPlan {
            document_id,
            total_pages,
            parts,
        })
    }
}

/// Reassembles part payloads, in the order given, into the source form.
/// Inverse of [`Splitter::split`] when parts arrive in part-number order.
pub fn reassemble_payloads<'a, I>(payloads: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = Vec::new();
    for (i, payload) in payloads.into_iter().enumerate() {
        if i > 0 {
            out.push(PAGE_SEPARATOR);
        }
        out.extend_from_slice(payload);
    }
    out
}
