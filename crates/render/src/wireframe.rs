use std::collections::HashSet;

/// Line-list indices covering every edge of a triangle list once.
///
/// Edges shared by two triangles are emitted a single time, in the order
/// they are first seen.
pub fn edge_list(triangle_indices: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::with_capacity(triangle_indices.len());
    let mut lines = Vec::with_capacity(triangle_indices.len() * 2);
    for tri in triangle_indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            if seen.insert((a.min(b), a.max(b))) {
                lines.push(a);
                lines.push(b);
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_edge_is_emitted_once() {
        // Two triangles forming a quad share the 1-3 diagonal.
        let lines = edge_list(&[0, 1, 3, 1, 2, 3]);
        assert_eq!(lines.len(), 5 * 2);
        assert_eq!(lines, vec![0, 1, 1, 3, 3, 0, 1, 2, 2, 3]);
    }

    #[test]
    fn trailing_partial_triangle_is_ignored() {
        assert_eq!(edge_list(&[0, 1, 2, 7]).len(), 6);
        assert!(edge_list(&[]).is_empty());
    }
}
