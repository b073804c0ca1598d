//! Directed update test matrix and codec self-test.
//!
//! The matrix pushes a sequence of deliberately valid and invalid images
//! through `update`, checks the device's verdict against the expectation, and
//! reads accepted images back with `dump`. It stops at the first failing case.

use anyhow::{Context, Result, bail};
use rand::{Rng, RngCore};
use tracing::{debug, info, instrument, warn};

use crate::client::ShieldClient;
use crate::events::ShieldObserver;
use crate::image::build_image_with;
use crate::protocol::cobs;
use crate::protocol::constants::{IMAGE_OVERHEAD, MAX_IMAGE_SIZE};
use crate::transport::PacketTransport;

/// One update test: how to build the image and what the device should say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub payload_len: usize,
    pub size_delta: i64,
    pub crc_delta: i64,
    pub expect_accept: bool,
}

impl TestCase {
    fn valid(name: impl Into<String>, payload_len: usize) -> Self {
        Self::tampered(name, payload_len, 0, 0, true)
    }

    fn tampered(
        name: impl Into<String>,
        payload_len: usize,
        size_delta: i64,
        crc_delta: i64,
        expect_accept: bool,
    ) -> Self {
        Self {
            name: name.into(),
            payload_len,
            size_delta,
            crc_delta,
            expect_accept,
        }
    }

    /// Wire image with a random payload.
    pub fn build_image<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        let mut payload = vec![0u8; self.payload_len];
        rng.fill_bytes(&mut payload);
        build_image_with(&payload, self.size_delta, self.crc_delta)
    }
}

/// The full update matrix, in execution order.
pub fn update_matrix() -> Vec<TestCase> {
    let mut cases = Vec::new();

    for size in 0..16 {
        cases.push(TestCase::valid(format!("Small size {size}"), size));
    }
    // Crosses the device's 256-byte read boundary
    for size in 240..270 {
        cases.push(TestCase::valid(format!("Byte boundary {size}"), size));
    }

    cases.push(TestCase::tampered("Bad CRC", 1024, 0, 1, false));
    cases.push(TestCase::tampered("Bad Size +1", 1024, 1, 0, false));
    cases.push(TestCase::tampered("Bad Size -1", 1024, -1, 0, false));
    cases.push(TestCase::tampered("Good Size +0", 1024, 0, 0, true));
    cases.push(TestCase::tampered(
        "Image too big",
        MAX_IMAGE_SIZE - IMAGE_OVERHEAD + 1,
        0,
        0,
        false,
    ));
    cases.push(TestCase::valid("Max size image", MAX_IMAGE_SIZE - IMAGE_OVERHEAD));

    cases
}

/// Result of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub name: String,
    pub expect_accept: bool,
    pub accepted: bool,
    /// Whether the dump matched the image. `None` when no dump was taken.
    pub readback_matches: Option<bool>,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.accepted == self.expect_accept && self.readback_matches != Some(false)
    }
}

/// What the runner reports while it works.
#[derive(Debug, Clone)]
pub enum MatrixEvent {
    CaseStarted {
        index: usize,
        total: usize,
        name: String,
        expect_accept: bool,
    },
    UpdateProgress {
        position: usize,
        total: usize,
    },
    DumpProgress {
        position: usize,
        total: usize,
    },
    CaseFinished(CaseOutcome),
}

/// Outcomes of the cases that ran.
#[derive(Debug, Clone, Default)]
pub struct MatrixReport {
    pub outcomes: Vec<CaseOutcome>,
    pub planned: usize,
}

impl MatrixReport {
    /// Every planned case ran and passed.
    pub fn passed(&self) -> bool {
        self.outcomes.len() == self.planned && self.outcomes.iter().all(CaseOutcome::passed)
    }

    pub fn first_failure(&self) -> Option<&CaseOutcome> {
        self.outcomes.iter().find(|outcome| !outcome.passed())
    }
}

/// Run `cases` in order, stopping at the first failure.
///
/// Link and protocol errors abort the run; a wrong verdict or a readback
/// mismatch is a failed case.
#[instrument(skip_all, fields(cases = cases.len()))]
pub fn run_matrix<T, O, R>(
    client: &mut ShieldClient<T, O>,
    cases: &[TestCase],
    rng: &mut R,
    on_event: &mut dyn FnMut(MatrixEvent),
) -> Result<MatrixReport>
where
    T: PacketTransport,
    O: ShieldObserver,
    R: Rng + ?Sized,
{
    let mut report = MatrixReport {
        outcomes: Vec::with_capacity(cases.len()),
        planned: cases.len(),
    };

    for (index, case) in cases.iter().enumerate() {
        on_event(MatrixEvent::CaseStarted {
            index,
            total: cases.len(),
            name: case.name.clone(),
            expect_accept: case.expect_accept,
        });

        let image = case.build_image(rng);
        let accepted = client
            .update(&image, &mut |position: usize, total: usize| {
                on_event(MatrixEvent::UpdateProgress { position, total })
            })
            .with_context(|| format!("update failed in \"{}\"", case.name))?;

        let readback_matches = if accepted && case.expect_accept {
            let dumped = client
                .dump(&mut |position: usize, total: usize| {
                    on_event(MatrixEvent::DumpProgress { position, total })
                })
                .with_context(|| format!("dump failed in \"{}\"", case.name))?;
            Some(dumped.as_deref() == Some(image.as_slice()))
        } else {
            None
        };

        let outcome = CaseOutcome {
            name: case.name.clone(),
            expect_accept: case.expect_accept,
            accepted,
            readback_matches,
        };
        let passed = outcome.passed();
        debug!(case = %outcome.name, accepted, passed, "Case finished");
        on_event(MatrixEvent::CaseFinished(outcome.clone()));
        report.outcomes.push(outcome);

        if !passed {
            warn!(case = %case.name, "Stopping at first failure");
            break;
        }
    }

    info!(
        ran = report.outcomes.len(),
        planned = report.planned,
        passed = report.passed(),
        "Matrix complete"
    );
    Ok(report)
}

/// Codec self-test: known-answer vectors, then `iterations` random
/// round-trips with and without padding.
pub fn cobs_self_test<R: Rng + ?Sized>(rng: &mut R, iterations: usize) -> Result<()> {
    for (index, (raw, encoded)) in cobs::reference_vectors().into_iter().enumerate() {
        if cobs::encode(&raw) != encoded {
            bail!("reference vector {index}: encode mismatch");
        }
        let decoded = cobs::decode(&encoded)
            .with_context(|| format!("reference vector {index}: decode failed"))?;
        if decoded != raw {
            bail!("reference vector {index}: decode mismatch");
        }
    }

    for iteration in 0..iterations {
        let len = rng.gen_range(0..1024);
        // Zero-heavy data exercises the overhead bytes
        let data: Vec<u8> = (0..len)
            .map(|_| if rng.gen_bool(0.25) { 0 } else { rng.r#gen() })
            .collect();

        let encoded = cobs::encode(&data);
        let padded = cobs::encode_padded(&data);
        if encoded.contains(&0) || padded.contains(&0) {
            bail!("iteration {iteration}: encoded frame contains a zero byte");
        }
        if cobs::decode(&encoded).ok().as_ref() != Some(&data) {
            bail!("iteration {iteration}: roundtrip mismatch for {len} bytes");
        }
        if cobs::decode_padded(&padded).ok().as_ref() != Some(&data) {
            bail!("iteration {iteration}: padded roundtrip mismatch for {len} bytes");
        }
    }

    debug!(iterations, "Codec self-test passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::image::validate;
    use crate::sim::{SimLink, SimulatedShield};
    use crate::transport::{LinkTiming, PacketStream};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(sim: &SimulatedShield) -> ShieldClient<PacketStream<SimLink>, NullObserver> {
        let stream = PacketStream::with_timing(
            sim.connect(),
            LinkTiming {
                read_timeout: Duration::from_secs(2),
                break_duration: Duration::ZERO,
                reset_settle: Duration::from_millis(5),
            },
        );
        ShieldClient::with_observer(stream, Arc::new(NullObserver))
    }

    #[test]
    fn test_matrix_layout() {
        let cases = update_matrix();
        assert_eq!(cases.len(), 16 + 30 + 6);
        assert_eq!(cases[0].name, "Small size 0");
        assert_eq!(cases[45].name, "Byte boundary 269");

        let rejected: Vec<&str> = cases
            .iter()
            .filter(|case| !case.expect_accept)
            .map(|case| case.name.as_str())
            .collect();
        assert_eq!(rejected, ["Bad CRC", "Bad Size +1", "Bad Size -1", "Image too big"]);

        let last = &cases[cases.len() - 1];
        assert_eq!(last.payload_len + IMAGE_OVERHEAD, MAX_IMAGE_SIZE);
    }

    #[test]
    fn test_case_images_match_expectation() {
        let mut rng = StdRng::seed_from_u64(7);
        for case in update_matrix() {
            let image = case.build_image(&mut rng);
            assert_eq!(validate(&image).is_ok(), case.expect_accept, "{}", case.name);
        }
    }

    #[test]
    fn test_seeded_images_reproducible() {
        let case = TestCase::valid("x", 64);
        let a = case.build_image(&mut StdRng::seed_from_u64(1));
        let b = case.build_image(&mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_cobs_self_test_passes() {
        cobs_self_test(&mut StdRng::seed_from_u64(99), 200).unwrap();
    }

    #[test]
    fn test_full_matrix_against_simulator() {
        let sim = SimulatedShield::new();
        let mut client = client(&sim);
        client.reset().unwrap();

        let cases = update_matrix();
        let mut finished = 0;
        let report = run_matrix(&mut client, &cases, &mut StdRng::seed_from_u64(5), &mut |event: MatrixEvent| {
            if let MatrixEvent::CaseFinished(_) = event {
                finished += 1;
            }
        })
        .unwrap();

        assert!(report.passed(), "{:?}", report.first_failure());
        assert_eq!(finished, cases.len());
        assert_eq!(sim.stored_image().len(), MAX_IMAGE_SIZE);
    }

    #[test]
    fn test_matrix_stops_at_first_failure() {
        let sim = SimulatedShield::new();
        let mut client = client(&sim);
        client.reset().unwrap();

        // Expecting a bad CRC to be accepted fails immediately
        let cases = vec![
            TestCase::tampered("Wrong expectation", 32, 0, 1, true),
            TestCase::valid("Never runs", 32),
        ];
        let report =
            run_matrix(&mut client, &cases, &mut StdRng::seed_from_u64(3), &mut |_: MatrixEvent| {}).unwrap();

        assert!(!report.passed());
        assert_eq!(report.outcomes.len(), 1);
        let failure = report.first_failure().unwrap();
        assert_eq!(failure.name, "Wrong expectation");
        assert!(!failure.accepted);
        assert_eq!(failure.readback_matches, None);
    }
}
