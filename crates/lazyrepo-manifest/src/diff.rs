use crate::ManifestEntry;

/// Produces the human-readable change list between two canonically ordered
/// manifests. Lines are emitted in canonical order, so the diff itself is
/// deterministic. Empty iff the two manifests have identical line sets.
pub fn diff_lines(previous: &[ManifestEntry], next: &[ManifestEntry]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut old = previous.iter().peekable();
    let mut new = next.iter().peekable();
    loop {
        match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(entry), None) => {
                lines.push(format!("- removed {} {}", entry.kind.label(), entry.id));
                old.next();
            }
            (None, Some(entry)) => {
                lines.push(format!("+ added {} {}", entry.kind.label(), entry.id));
                new.next();
            }
            (Some(before), Some(after)) => match before.order_key().cmp(&after.order_key()) {
                std::cmp::Ordering::Less => {
                    lines.push(format!("- removed {} {}", before.kind.label(), before.id));
                    old.next();
                }
                std::cmp::Ordering::Greater => {
                    lines.push(format!("+ added {} {}", after.kind.label(), after.id));
                    new.next();
                }
                std::cmp::Ordering::Equal => {
                    if before.hash != after.hash {
                        lines.push(format!("± changed {} {}", after.kind.label(), after.id));
                    }
                    old.next();
                    new.next();
                }
            },
        }
    }
    lines
}
