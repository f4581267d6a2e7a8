//! Risk-domain detection.
//!
//! Keyword and structural signals, each weighted, are summed per domain and
//! saturated into a confidence. Detection only decides which methods are
//! worth running, so it is cheap and never fails.

use crate::types::{Ambiguity, ArtifactDomain, DomainConfidence, DomainDetectionResult};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Summed weight at which a domain reaches full confidence.
pub const SATURATION: f64 = 3.0;

struct DomainSignal {
    domain: ArtifactDomain,
    label: &'static str,
    pattern: Regex,
    weight: f64,
}

static SIGNALS: LazyLock<Vec<DomainSignal>> = LazyLock::new(|| {
    use ArtifactDomain::*;

    [
        // security
        (Security, "credentials", r"(?i)\b(password|passwd|secret|api[_-]?key|credential)s?\b", 1.0),
        (Security, "authentication", r"(?i)\b(auth|authenticat\w*|authoriz\w*|login)\b", 1.0),
        (Security, "tokens", r"(?i)\b(jwt|bearer|access[_-]?token|refresh[_-]?token|csrf)\b", 1.0),
        (Security, "cryptography", r"(?i)\b(encrypt|decrypt|hmac|sha256|bcrypt|crypto\w*|cipher)\b", 0.8),
        (Security, "authorization", r"(?i)\b(permission|privilege|rbac|acl|role)s?\b", 0.8),
        (Security, "untrusted input", r"(?i)(request\.(args|form|params|query|body)|user[_ ]input|req\.(query|params|body))", 0.8),
        (Security, "interpolated query", r#"(?i)(execute|query|raw)\s*\(\s*(f["']|["'][^"']*["']\s*(\+|%)|`[^`]*\$\{)"#, 1.5),
        (Security, "injection", r"(?i)\b(injection|sanitiz\w*|escap\w*|xss)\b", 0.8),
        // storage
        (Storage, "sql statement", r"(?i)\b(select\s+.+\s+from|insert\s+into|update\s+\w+\s+set|delete\s+from)\b", 1.5),
        (Storage, "database handle", r"(?i)\b(database|cursor|db\.|sqlalchemy|postgres\w*|mysql|sqlite|mongo\w*)", 1.0),
        (Storage, "transactions", r"(?i)\b(transaction|commit|rollback|savepoint)\b", 1.0),
        (Storage, "query execution", r"(?i)\b(execute|executemany|fetchone|fetchall|query)\s*\(", 1.0),
        (Storage, "schema", r"(?i)\b(schema|migration|table|index|primary key|foreign key)\b", 0.6),
        (Storage, "cache", r"(?i)\b(cache|redis|memcached)\b", 0.6),
        // transform
        (Transform, "serialization", r"(?i)\b(parse|serializ\w*|deserializ\w*|marshal|unmarshal)\b", 1.0),
        (Transform, "data formats", r"(?i)\b(json|xml|csv|yaml|protobuf|avro)\b", 0.8),
        (Transform, "conversion", r"(?i)\b(transform\w*|convert\w*|mapping|normaliz\w*)\b", 0.8),
        (Transform, "encoding", r"(?i)\b(encode|decode|encoding|utf-?8|base64)\b", 0.6),
        // concurrency
        (Concurrency, "threads", r"(?i)\b(thread\w*|goroutine|go\s+func|spawn|tokio::spawn|threading)\b", 1.0),
        (Concurrency, "locks", r"(?i)\b(mutex|rwlock|lock\(\)|semaphore|atomic\w*|sync\.Mutex)\b", 1.2),
        (Concurrency, "async", r"(?i)\b(async|await|asyncio|futures?|promise)\b", 0.6),
        (Concurrency, "hazards", r"(?i)\b(race|deadlock|livelock|starvation)\b", 1.0),
        (Concurrency, "coordination", r"(?i)\b(concurrent\w*|parallel\w*|worker[_ ]pool|waitgroup|chan\s+\w+|barrier)\b", 1.0),
        // api
        (Api, "http", r"(?i)\b(https?|endpoint|route|router|handler)s?\b", 1.2),
        (Api, "framework route", r"(?i)@(app|router|bp)\.(get|post|put|delete|patch|route)\b", 1.5),
        (Api, "request/response", r"(?i)\b(request|response)s?\b", 0.8),
        (Api, "api styles", r"(?i)\b(rest|restful|graphql|grpc|openapi|webhook)\b", 1.0),
        (Api, "status codes", r"(?i)\b(status[_ ]code|40[0-4]|50[0-3])\b", 0.6),
        // messaging
        (Messaging, "brokers", r"(?i)\b(kafka|rabbitmq|amqp|sqs|sns|pubsub|nats|mqtt)\b", 1.5),
        (Messaging, "pub/sub", r"(?i)\b(publish\w*|subscrib\w*|consumer|producer)s?\b", 1.0),
        (Messaging, "messages", r"(?i)\b(message|event|topic|queue)s?\b", 0.8),
        (Messaging, "acknowledgement", r"(?i)\b(ack|nack|dead[_ -]letter|dlq|redeliver\w*)\b", 0.8),
        (Messaging, "delivery semantics", r"(?i)(exactly[_ -]once|at[_ -]least[_ -]once|at[_ -]most[_ -]once|idempoten\w*)", 1.0),
    ]
    .into_iter()
    .map(|(domain, label, pattern, weight)| DomainSignal {
        domain,
        label,
        pattern: Regex::new(pattern).expect("valid domain signal regex"),
        weight,
    })
    .collect()
});

/// Keyword-weighted domain classifier.
#[derive(Debug, Clone)]
pub struct DomainDetector {
    min_confidence: f64,
}

impl Default for DomainDetector {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl DomainDetector {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Detect domains in `artifact`, highest confidence first.
    pub fn detect(&self, artifact: &str) -> DomainDetectionResult {
        let mut domains: Vec<DomainConfidence> = ArtifactDomain::ALL
            .into_iter()
            .filter_map(|domain| {
                let matched: Vec<&DomainSignal> = SIGNALS
                    .iter()
                    .filter(|s| s.domain == domain && s.pattern.is_match(artifact))
                    .collect();
                if matched.is_empty() {
                    return None;
                }

                let weight: f64 = matched.iter().map(|s| s.weight).sum();
                let confidence = round2((weight / SATURATION).min(1.0));
                (confidence >= self.min_confidence).then(|| DomainConfidence {
                    domain,
                    confidence,
                    signals: matched.iter().map(|s| s.label.to_string()).collect(),
                })
            })
            .collect();

        // stable: equal confidences keep declaration order
        domains.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let ambiguity = ambiguity(&domains);
        let primary = domains.first().map(|d| d.domain);

        debug!(
            domains = ?domains.iter().map(|d| (d.domain, d.confidence)).collect::<Vec<_>>(),
            ambiguity = ?ambiguity,
            "Detected domains"
        );

        DomainDetectionResult {
            domains,
            primary,
            ambiguity,
        }
    }
}

fn ambiguity(domains: &[DomainConfidence]) -> Ambiguity {
    match domains {
        [first, second, ..] => {
            let gap = first.confidence - second.confidence;
            if gap < 0.1 {
                Ambiguity::High
            } else if gap < 0.25 {
                Ambiguity::Medium
            } else {
                Ambiguity::Low
            }
        }
        _ => Ambiguity::None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
