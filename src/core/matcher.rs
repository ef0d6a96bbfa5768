use crate::core::cache::Snapshot;
use crate::storage::StudentProfile;

/// Cosine similarity in [-1, 1]. Zero-norm or mismatched vectors score 0.0
/// so a degenerate embedding can never match anyone.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Match {
        student: StudentProfile,
        similarity: f32,
    },
    /// Best similarity seen, reported for operator diagnostics. Never
    /// promoted to a match below the threshold.
    Unknown { similarity: f32 },
}

/// Compares one live embedding against a cache snapshot. Read-only.
pub struct FaceMatcher {
    threshold: f32,
}

impl FaceMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Scans every stored embedding of every cached student and keeps the
    /// single best (student, similarity) pair. Ties keep the first-seen
    /// student in scan order.
    pub fn match_embedding(&self, live: &[f32], snapshot: &Snapshot) -> MatchOutcome {
        let mut best_similarity = f32::MIN;
        let mut best_student: Option<&StudentProfile> = None;

        for student in &snapshot.students {
            for stored in &student.embeddings {
                let similarity = cosine_similarity(live, stored);
                if similarity > best_similarity {
                    best_similarity = similarity;
                    best_student = Some(student);
                }
            }
        }

        let similarity = if best_student.is_some() {
            best_similarity
        } else {
            0.0
        };

        match best_student {
            Some(student) if similarity >= self.threshold => MatchOutcome::Match {
                student: student.clone(),
                similarity,
            },
            _ => MatchOutcome::Unknown { similarity },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn student(id: &str, embeddings: Vec<Vec<f32>>) -> StudentProfile {
        StudentProfile {
            student_id: id.to_string(),
            auth_uid: Some(format!("uid-{}", id)),
            full_name: format!("Student {}", id),
            class: "12B".to_string(),
            shift: "Morning".to_string(),
            grace_period_minutes: None,
            embeddings,
        }
    }

    fn snapshot(students: Vec<StudentProfile>) -> Snapshot {
        Snapshot {
            students,
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn below_threshold_is_unknown_with_similarity() {
        // ~0.9 similarity against a 0.92 threshold must not match.
        let snap = snapshot(vec![student("a", vec![vec![1.0, 0.0]])]);
        let matcher = FaceMatcher::new(0.92);

        let live = [0.9, f32::sqrt(1.0 - 0.81)];
        match matcher.match_embedding(&live, &snap) {
            MatchOutcome::Unknown { similarity } => {
                assert!((similarity - 0.9).abs() < 1e-3);
            }
            MatchOutcome::Match { .. } => panic!("similarity below threshold must not match"),
        }
    }

    #[test]
    fn best_pair_wins_across_students() {
        let snap = snapshot(vec![
            student("far", vec![vec![0.5, 0.5]]),
            student("near", vec![vec![0.1, 0.1], vec![1.0, 0.01]]),
        ]);
        let matcher = FaceMatcher::new(0.92);

        match matcher.match_embedding(&[1.0, 0.0], &snap) {
            MatchOutcome::Match { student, .. } => assert_eq!(student.student_id, "near"),
            MatchOutcome::Unknown { .. } => panic!("expected a match"),
        }
    }

    #[test]
    fn threshold_is_monotonic() {
        let snap = snapshot(vec![student("a", vec![vec![1.0, 0.0]])]);
        let live = [0.95, f32::sqrt(1.0 - 0.9025)];

        let mut previously_matched = true;
        for threshold in [0.90, 0.93, 0.96, 0.99] {
            let matched = matches!(
                FaceMatcher::new(threshold).match_embedding(&live, &snap),
                MatchOutcome::Match { .. }
            );
            // Raising the threshold can only turn a match into unknown.
            assert!(previously_matched || !matched);
            previously_matched = matched;
        }
    }

    #[test]
    fn empty_cache_is_unknown() {
        let matcher = FaceMatcher::new(0.92);
        match matcher.match_embedding(&[1.0, 0.0], &snapshot(Vec::new())) {
            MatchOutcome::Unknown { similarity } => assert_eq!(similarity, 0.0),
            MatchOutcome::Match { .. } => panic!("nothing to match against"),
        }
    }
}
