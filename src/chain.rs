//! Extension struct-chain integrity guard
//!
//! Arguments to the intercepted API may carry a chain of extension
//! structures, each starting with a type discriminator and a pointer to
//! the next element. The runtime may read the chain but must not mutate
//! it in place. [`ChainGuard`] snapshots a chain when the interceptor
//! enters a call and re-walks it when the guard drops; any difference in
//! length, element types, or next pointers is reported as a
//! struct-chain-mutated finding.
//!
//! Walks are capped so a deliberately cyclic chain cannot hang the
//! validator; exceeding the cap is itself reported.

use crate::api::ChainHeader;
use crate::report::Reporter;

/// Upper bound on walked chain elements. No real extension chain comes
/// anywhere near this; hitting it means a cycle or garbage pointer.
const MAX_CHAIN_LEN: usize = 256;

#[derive(Debug, PartialEq, Eq)]
enum Walk {
    Complete(Vec<(u32, *const ChainHeader)>),
    /// The cap was hit before a null next pointer.
    Truncated,
}

/// Walk a chain, recording each element's type discriminator and next
/// pointer.
///
/// # Safety
///
/// `head` must be null or point to a chain of live, properly aligned
/// [`ChainHeader`]-prefixed structures.
unsafe fn walk(head: *const ChainHeader) -> Walk {
    let mut entries = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        if entries.len() >= MAX_CHAIN_LEN {
            return Walk::Truncated;
        }
        let header = &*cursor;
        let next = header.next as *const ChainHeader;
        entries.push((header.struct_type, next));
        cursor = next;
    }
    Walk::Complete(entries)
}

/// Scoped snapshot of a struct chain, compared on drop.
pub struct ChainGuard {
    call: &'static str,
    head: *const ChainHeader,
    snapshot: Walk,
    reporter: Reporter,
}

impl ChainGuard {
    /// Capture the chain hanging off `head`.
    ///
    /// # Safety
    ///
    /// `head` must be null or point to a valid chain, and the chain
    /// memory must stay live until the guard is dropped.
    pub unsafe fn capture(call: &'static str, head: *const ChainHeader, reporter: &Reporter) -> Self {
        let snapshot = walk(head);
        if snapshot == Walk::Truncated {
            reporter.chain_mutated(
                call,
                format!(
                    "struct chain did not terminate within {} elements (cyclic or corrupt)",
                    MAX_CHAIN_LEN
                ),
            );
        }
        Self {
            call,
            head,
            snapshot,
            reporter: reporter.clone(),
        }
    }
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        // Safety: the capture contract requires the chain to outlive the
        // guard.
        let after = unsafe { walk(self.head) };

        let (before, after) = match (&self.snapshot, &after) {
            (Walk::Complete(b), Walk::Complete(a)) => (b, a),
            (Walk::Truncated, _) | (_, Walk::Truncated) => {
                // Already reported at capture; a chain that became cyclic
                // during the call is reported here.
                if self.snapshot != Walk::Truncated {
                    self.reporter.chain_mutated(
                        self.call,
                        "struct chain no longer terminates after the call".to_string(),
                    );
                }
                return;
            }
        };

        if before.len() != after.len() {
            self.reporter.chain_mutated(
                self.call,
                format!(
                    "struct chain length changed across the call: {} elements before, {} after",
                    before.len(),
                    after.len()
                ),
            );
            return;
        }

        for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
            if b.0 != a.0 {
                self.reporter.chain_mutated(
                    self.call,
                    format!(
                        "struct chain element {} changed type across the call: {:#x} -> {:#x}",
                        i, b.0, a.0
                    ),
                );
            }
            if b.1 != a.1 {
                self.reporter.chain_mutated(
                    self.call,
                    format!("struct chain element {} next pointer changed across the call", i),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingSink;
    use std::ptr;
    use std::sync::Arc;

    fn reporter() -> (Reporter, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        (Reporter::new(sink.clone()), sink)
    }

    #[test]
    fn untouched_chain_is_clean() {
        let (reporter, sink) = reporter();
        let mut tail = ChainHeader {
            struct_type: 0x2000,
            next: ptr::null_mut(),
        };
        let mut head = ChainHeader {
            struct_type: 0x1000,
            next: &mut tail,
        };

        {
            let _guard = unsafe { ChainGuard::capture("endFrame", &mut head, &reporter) };
        }
        assert_eq!(sink.findings().len(), 0);
    }

    #[test]
    fn null_chain_is_clean() {
        let (reporter, sink) = reporter();
        {
            let _guard = unsafe { ChainGuard::capture("endFrame", ptr::null(), &reporter) };
        }
        assert_eq!(sink.findings().len(), 0);
    }

    #[test]
    fn unlinked_element_is_reported() {
        let (reporter, sink) = reporter();
        let mut tail = ChainHeader {
            struct_type: 0x2000,
            next: ptr::null_mut(),
        };
        let mut head = ChainHeader {
            struct_type: 0x1000,
            next: &mut tail,
        };

        {
            let _guard = unsafe { ChainGuard::capture("endFrame", &mut head, &reporter) };
            head.next = ptr::null_mut();
        }
        let findings = sink.findings();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("length changed"));
    }

    #[test]
    fn retyped_element_is_reported() {
        let (reporter, sink) = reporter();
        let mut head = ChainHeader {
            struct_type: 0x1000,
            next: ptr::null_mut(),
        };

        {
            let _guard = unsafe { ChainGuard::capture("beginFrame", &mut head, &reporter) };
            head.struct_type = 0x3000;
        }
        let findings = sink.findings();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("changed type"));
    }

    #[test]
    fn relinked_element_is_reported() {
        let (reporter, sink) = reporter();
        let mut tail_a = ChainHeader {
            struct_type: 0x2000,
            next: ptr::null_mut(),
        };
        let mut tail_b = ChainHeader {
            struct_type: 0x2000,
            next: ptr::null_mut(),
        };
        let mut head = ChainHeader {
            struct_type: 0x1000,
            next: &mut tail_a,
        };

        {
            let _guard = unsafe { ChainGuard::capture("endFrame", &mut head, &reporter) };
            head.next = &mut tail_b;
        }
        let findings = sink.findings();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("next pointer changed"));
    }

    #[test]
    fn cyclic_chain_is_reported_at_capture() {
        let (reporter, sink) = reporter();
        let mut head = ChainHeader {
            struct_type: 0x1000,
            next: ptr::null_mut(),
        };
        let head_ptr: *mut ChainHeader = &mut head;
        unsafe { (*head_ptr).next = head_ptr };

        {
            let _guard = unsafe { ChainGuard::capture("endFrame", head_ptr, &reporter) };
        }
        assert_eq!(sink.findings().len(), 1);
        assert!(sink.findings()[0].message.contains("did not terminate"));
    }
}
