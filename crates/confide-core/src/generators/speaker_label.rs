// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use confide_model::{Generator, Message, ModelError, OptionalParams, TaskId};
use serde::{Deserialize, Serialize};

use crate::types::TranscriptSegment;

#[derive(Debug, Clone)]
pub struct SpeakerLabelInput {
    pub transcript: Vec<TranscriptSegment>,
}

/// A therapist typically speaks less than their client; this is the
/// empirical speaking-time-share band the heuristic half of the fusion
/// checks against (§4.3).
const THERAPIST_RATIO_RANGE: (f64, f64) = (0.25, 0.45);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerLabelResult {
    /// `speaker_id -> "Therapist" | "Client"`.
    pub labels: BTreeMap<String, String>,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawSpeakerLabelResult {
    guessed_therapist: String,
    confidence: f32,
}

pub struct SpeakerLabelGenerator {
    transcript: Vec<TranscriptSegment>,
}

impl SpeakerLabelGenerator {
    pub fn new(transcript: Vec<TranscriptSegment>) -> Self {
        Self { transcript }
    }
}

/// Total speaking seconds per `speaker_id`, in descending duration order
/// is not guaranteed; callers look up specific ids.
fn speaking_time_by_speaker(transcript: &[TranscriptSegment]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for seg in transcript {
        *totals.entry(seg.speaker_id.clone()).or_insert(0.0) += seg.end_sec - seg.start_sec;
    }
    totals
}

/// Fuses the model's guess with the speaking-ratio heuristic. If the
/// model's candidate falls inside the therapist ratio band, confidence is
/// boosted; if it falls clearly outside while the other speaker falls
/// inside, the heuristic overrides the model with a reduced confidence.
fn fuse(
    transcript: &[TranscriptSegment],
    guessed_therapist: &str,
    model_confidence: f32,
) -> (String, f32) {
    let totals = speaking_time_by_speaker(transcript);
    let total: f64 = totals.values().sum();
    if total <= 0.0 || totals.len() != 2 {
        return (guessed_therapist.to_string(), model_confidence);
    }

    let ratio_of = |id: &str| totals.get(id).copied().unwrap_or(0.0) / total;
    let in_band = |r: f64| r >= THERAPIST_RATIO_RANGE.0 && r <= THERAPIST_RATIO_RANGE.1;

    let guessed_ratio = ratio_of(guessed_therapist);
    let other_id = totals
        .keys()
        .find(|id| id.as_str() != guessed_therapist)
        .cloned()
        .unwrap_or_default();
    let other_ratio = ratio_of(&other_id);

    if in_band(guessed_ratio) {
        (guessed_therapist.to_string(), (model_confidence + 0.1).min(1.0))
    } else if in_band(other_ratio) {
        (other_id, 0.5)
    } else {
        (guessed_therapist.to_string(), model_confidence * 0.8)
    }
}

impl Generator for SpeakerLabelGenerator {
    type Input = ();
    type Output = SpeakerLabelResult;

    fn task_id(&self) -> TaskId {
        TaskId::SpeakerLabel
    }

    fn build_messages(&self, _input: &()) -> Vec<Message> {
        let transcript = self
            .transcript
            .iter()
            .map(|s| format!("{}: {}", s.speaker_id, s.text))
            .collect::<Vec<_>>()
            .join("\n");
        vec![
            Message::system(
                "Given a two-speaker therapy transcript, guess which speaker \
                 id is the therapist. Respond with JSON: \
                 {guessed_therapist: speaker id, confidence: 0-1}.",
            ),
            Message::user(transcript),
        ]
    }

    fn parse_result(&self, raw_text: &str) -> Result<SpeakerLabelResult, ModelError> {
        let raw: RawSpeakerLabelResult =
            serde_json::from_str(raw_text).map_err(|e| ModelError::Parse(e.to_string()))?;

        let (therapist_id, confidence) =
            fuse(&self.transcript, &raw.guessed_therapist, raw.confidence.clamp(0.0, 1.0));

        let mut labels = BTreeMap::new();
        for id in speaking_time_by_speaker(&self.transcript).keys() {
            let role = if *id == therapist_id { "Therapist" } else { "Client" };
            labels.insert(id.clone(), role.to_string());
        }

        Ok(SpeakerLabelResult { labels, confidence })
    }

    fn optional_params(&self) -> OptionalParams {
        OptionalParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(speaker: &str, start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment {
            start_sec: start,
            end_sec: end,
            speaker_id: speaker.to_string(),
            text: "x".into(),
        }
    }

    #[test]
    fn model_guess_in_band_is_boosted() {
        // S0 speaks 30/100 = 0.3, in band.
        let transcript = vec![segment("S0", 0.0, 30.0), segment("S1", 30.0, 100.0)];
        let (id, confidence) = fuse(&transcript, "S0", 0.7);
        assert_eq!(id, "S0");
        assert!(confidence > 0.7);
    }

    #[test]
    fn model_guess_out_of_band_is_overridden_by_heuristic() {
        // S0 speaks 80/100 = 0.8 (out of band), S1 speaks 20/100 = 0.2 (out of band too narrow)... adjust.
        let transcript = vec![segment("S0", 0.0, 65.0), segment("S1", 65.0, 100.0)];
        // S0 ratio 0.65 (out), S1 ratio 0.35 (in band) -> override to S1.
        let (id, confidence) = fuse(&transcript, "S0", 0.9);
        assert_eq!(id, "S1");
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn neither_speaker_in_band_keeps_model_guess_with_reduced_confidence() {
        let transcript = vec![segment("S0", 0.0, 90.0), segment("S1", 90.0, 100.0)];
        let (id, confidence) = fuse(&transcript, "S0", 0.9);
        assert_eq!(id, "S0");
        assert!((confidence - 0.72).abs() < 1e-6);
    }

    #[test]
    fn parse_result_labels_both_speakers() {
        let transcript = vec![segment("S0", 0.0, 30.0), segment("S1", 30.0, 100.0)];
        let generator = SpeakerLabelGenerator::new(transcript);
        let raw = serde_json::json!({"guessed_therapist": "S0", "confidence": 0.7});
        let result = generator.parse_result(&raw.to_string()).unwrap();
        assert_eq!(result.labels.get("S0"), Some(&"Therapist".to_string()));
        assert_eq!(result.labels.get("S1"), Some(&"Client".to_string()));
    }
}
