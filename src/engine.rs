//! The decision engine which ties the individual checkers together.

use std::cmp::Reverse;

use thiserror::Error;

use crate::checker::UrlChecker;
use crate::models::{Detection, Reason, Severity, Source};
use crate::store::StoreError;
use crate::url::{hash_url, MalformedUrl};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Malformed(#[from] MalformedUrl),
    /// A rule source failed. We never fail open: a URL cannot be declared
    /// clean while any source is unreadable.
    #[error("Rule source unavailable: {0}")]
    SourceUnavailable(#[from] StoreError),
}

/// Options controlling a single check.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Disable the allow list protection
    pub allow_all: bool,
    /// Stop querying further sources at the first mandatory detection
    pub fail_fast: bool,
    /// Reasons to drop from the results
    pub ignore_reasons: Vec<Reason>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            allow_all: false,
            fail_fast: true,
            ignore_reasons: Vec::new(),
        }
    }
}

/// A wrapper around the individual checking rules.
pub struct UrlCheckerService {
    blocking_checkers: Vec<(Source, Box<dyn UrlChecker>)>,
    allowing_checkers: Vec<(Source, Box<dyn UrlChecker>)>,
}

impl UrlCheckerService {
    pub fn new(
        malware_feed: Box<dyn UrlChecker>,
        block_rules: Box<dyn UrlChecker>,
        allow_rules: Box<dyn UrlChecker>,
    ) -> Self {
        UrlCheckerService {
            blocking_checkers: vec![
                (Source::MalwareFeed, malware_feed),
                (Source::BlockList, block_rules),
            ],
            allowing_checkers: vec![(Source::AllowList, allow_rules)],
        }
    }

    /// Check for reasons to block a URL.
    ///
    /// Returns detections worst first. Fails with [`MalformedUrl`] if the
    /// URL cannot be canonicalized at all.
    pub fn check_url(&self, url: &str, options: &CheckOptions) -> Result<Vec<Detection>, CheckError> {
        let hashes = hash_url(url)?;
        let mut detections = self.get_detections(&hashes, options)?;

        // One detection per (reason, source) pair
        let mut seen = Vec::with_capacity(detections.len());
        detections.retain(|detection| {
            if seen.contains(detection) {
                false
            } else {
                seen.push(*detection);
                true
            }
        });

        // Worst first, with equal severities in the documented reason order
        detections
            .sort_by_key(|detection| (Reverse(detection.severity()), detection.reason.priority()));

        Ok(detections)
    }

    fn get_detections(
        &self,
        hashes: &[String],
        options: &CheckOptions,
    ) -> Result<Vec<Detection>, CheckError> {
        let mut detections = Vec::new();

        for (source, checker) in self.checkers(options.allow_all) {
            for reason in checker.check_hashes(hashes)? {
                if options.ignore_reasons.contains(&reason) {
                    continue;
                }

                detections.push(Detection::new(reason, *source));

                // No point searching further sources once we've been told
                // this is a mandatory block. This fires per detection, so a
                // mandatory hit short-circuits even when the same source
                // also produced advisory ones.
                if options.fail_fast && reason.severity() == Severity::Mandatory {
                    return Ok(detections);
                }
            }
        }

        Ok(detections)
    }

    fn checkers(&self, allow_all: bool) -> impl Iterator<Item = &(Source, Box<dyn UrlChecker>)> {
        self.blocking_checkers.iter().chain(
            self.allowing_checkers
                .iter()
                .filter(move |_| !allow_all),
        )
    }
}

/// The worst severity in a set of detections (if any).
pub fn max_severity(detections: &[Detection]) -> Option<Severity> {
    detections.iter().map(Detection::severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A canned checker which counts how often it is queried.
    struct FakeChecker {
        reasons: Vec<Reason>,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl FakeChecker {
        fn new(reasons: Vec<Reason>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                FakeChecker {
                    reasons,
                    calls: calls.clone(),
                    fail: false,
                },
                calls,
            )
        }
    }

    impl UrlChecker for FakeChecker {
        fn check_hashes(&self, _hashes: &[String]) -> store::Result<Vec<Reason>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(store::StoreError::Poisoned);
            }
            Ok(self.reasons.clone())
        }
    }

    fn service(
        feed: Vec<Reason>,
        block: Vec<Reason>,
        allow: Vec<Reason>,
    ) -> (UrlCheckerService, [Arc<AtomicUsize>; 3]) {
        let (feed, feed_calls) = FakeChecker::new(feed);
        let (block, block_calls) = FakeChecker::new(block);
        let (allow, allow_calls) = FakeChecker::new(allow);

        (
            UrlCheckerService::new(Box::new(feed), Box::new(block), Box::new(allow)),
            [feed_calls, block_calls, allow_calls],
        )
    }

    #[test]
    fn test_not_allowed_is_the_default_verdict() {
        let (service, _) = service(vec![], vec![], vec![Reason::NotAllowed]);

        let detections = service
            .check_url("http://example.com", &CheckOptions::default())
            .unwrap();

        assert_eq!(
            detections,
            vec![Detection::new(Reason::NotAllowed, Source::AllowList)]
        );
    }

    #[test]
    fn test_allow_all_skips_the_allow_list() {
        let (service, [_, _, allow_calls]) = service(vec![], vec![], vec![Reason::NotAllowed]);

        let detections = service
            .check_url(
                "http://example.com",
                &CheckOptions {
                    allow_all: true,
                    ..CheckOptions::default()
                },
            )
            .unwrap();

        assert!(detections.is_empty());
        assert_eq!(allow_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fail_fast_short_circuits_later_checkers() {
        let (service, [feed_calls, block_calls, allow_calls]) = service(
            vec![Reason::Malicious],
            vec![Reason::MediaVideo],
            vec![Reason::NotAllowed],
        );

        let detections = service
            .check_url("http://example.com", &CheckOptions::default())
            .unwrap();

        assert_eq!(
            detections,
            vec![Detection::new(Reason::Malicious, Source::MalwareFeed)]
        );
        assert_eq!(feed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(block_calls.load(Ordering::SeqCst), 0);
        assert_eq!(allow_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fail_fast_fires_mid_batch() {
        let (service, [_, block_calls, _]) = service(
            vec![],
            vec![Reason::MediaImage, Reason::PublisherBlocked, Reason::HighIo],
            vec![Reason::NotAllowed],
        );

        let detections = service
            .check_url("http://example.com", &CheckOptions::default())
            .unwrap();

        // The mandatory hit stops collection even within one source's batch
        assert_eq!(
            detections,
            vec![
                Detection::new(Reason::PublisherBlocked, Source::BlockList),
                Detection::new(Reason::MediaImage, Source::BlockList),
            ]
        );
        assert_eq!(block_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_fail_fast_everything_is_collected() {
        let (service, _) = service(
            vec![Reason::Malicious],
            vec![Reason::MediaVideo],
            vec![Reason::NotAllowed],
        );

        let detections = service
            .check_url(
                "http://example.com",
                &CheckOptions {
                    fail_fast: false,
                    ..CheckOptions::default()
                },
            )
            .unwrap();

        assert_eq!(
            detections,
            vec![
                Detection::new(Reason::Malicious, Source::MalwareFeed),
                Detection::new(Reason::MediaVideo, Source::BlockList),
                Detection::new(Reason::NotAllowed, Source::AllowList),
            ]
        );
    }

    #[test]
    fn test_ordering_and_dedupe() {
        let (service, _) = service(
            vec![],
            vec![
                Reason::HighIo,
                Reason::MediaVideo,
                Reason::MediaVideo,
                Reason::PublisherBlocked,
            ],
            vec![],
        );

        let detections = service
            .check_url(
                "http://example.com",
                &CheckOptions {
                    fail_fast: false,
                    ..CheckOptions::default()
                },
            )
            .unwrap();

        assert_eq!(
            detections,
            vec![
                Detection::new(Reason::PublisherBlocked, Source::BlockList),
                Detection::new(Reason::MediaVideo, Source::BlockList),
                Detection::new(Reason::HighIo, Source::BlockList),
            ]
        );
    }

    #[test]
    fn test_ignore_reasons() {
        let (service, _) = service(vec![], vec![Reason::MediaVideo], vec![Reason::NotAllowed]);

        let detections = service
            .check_url(
                "http://example.com",
                &CheckOptions {
                    fail_fast: false,
                    ignore_reasons: vec![Reason::MediaVideo, Reason::NotAllowed],
                    ..CheckOptions::default()
                },
            )
            .unwrap();

        assert!(detections.is_empty());
    }

    #[test]
    fn test_malformed_url() {
        let (service, _) = service(vec![], vec![], vec![]);

        assert!(matches!(
            service.check_url("http://example.com]", &CheckOptions::default()),
            Err(CheckError::Malformed(_))
        ));
    }

    #[test]
    fn test_source_failures_are_not_failures_open() {
        let (mut feed, _) = FakeChecker::new(vec![]);
        feed.fail = true;
        let (block, _) = FakeChecker::new(vec![]);
        let (allow, _) = FakeChecker::new(vec![]);

        let service = UrlCheckerService::new(Box::new(feed), Box::new(block), Box::new(allow));

        assert!(matches!(
            service.check_url("http://example.com", &CheckOptions::default()),
            Err(CheckError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_max_severity() {
        assert_eq!(max_severity(&[]), None);
        assert_eq!(
            max_severity(&[Detection::new(Reason::MediaVideo, Source::BlockList)]),
            Some(Severity::Advisory)
        );
        assert_eq!(
            max_severity(&[
                Detection::new(Reason::MediaVideo, Source::BlockList),
                Detection::new(Reason::Malicious, Source::MalwareFeed),
            ]),
            Some(Severity::Mandatory)
        );
    }
}
