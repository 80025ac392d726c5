//! End-to-end property tests driven through the whole-message convenience
//! functions, covering the behaviors that only show up once signing and
//! verification are wired together — individual modules already test their
//! own units in isolation.

#![cfg(test)]

use crate::canonicalization;
use crate::context::{Context, Verdict};
use crate::dns::FileDriver;
use crate::library::LibraryHandle;
use crate::sign::{sign_message, SignRequest};
use crate::verify::verify_message;
use crate::{ConfigKey, ConfigValue, Flags};
use std::sync::Arc;

fn rsa_key() -> &'static [u8] {
    include_bytes!("../test/keys/2022.private")
}

fn rsa_pub_txt() -> String {
    let pem = include_str!("../test/keys/2022.public");
    let body: String = pem
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, body).unwrap();
    let p = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, der);
    format!("v=DKIM1; k=rsa; p={p}")
}

fn ed25519_key() -> &'static [u8] {
    include_bytes!("../test/keys/ed.private.pem")
}

// RFC 8463 appendix A.3's "Joe SixPack" message and Ed25519 signature,
// verified against the matching appendix A.2 public key. Verify-only: this
// crate's own Ed25519 test key is unrelated to the RFC's, so there's no
// corresponding private key to re-sign with here.
const RFC8463_RAW_MESSAGE: &[u8] = b"DKIM-Signature: v=1; a=ed25519-sha256; c=relaxed/relaxed;\r\n\
 d=football.example.com; i=@football.example.com;\r\n\
 q=dns/txt; s=brisbane; t=1528637909; h=from : to :\r\n\
 subject : date : message-id : from : subject : date;\r\n\
 bh=2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=;\r\n\
 b=/gCrinpcQOoIfuHNQIbq4pgh9kyIK3AQUdt9OdqQehSwhEIug4D11Bus\r\n\
 Fa3bT3FY5OsU7ZbnKELq+eXdp1Q1Dw==\r\n\
From: Joe SixPack <joe@football.example.com>\r\n\
To: Suzie Q <suzie@shopping.example.net>\r\n\
Subject: Is dinner ready?\r\n\
Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)\r\n\
Message-ID: <20030712040037.46341.5F8J@football.example.com>\r\n\
\r\n\
Hi.\r\n\
\r\n\
We lost the game.  Are you hungry yet?\r\n\
\r\n\
Joe.\r\n";

#[tokio::test]
async fn rfc8463_ed25519_vector_verifies() {
    let lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new().with_txt(
        "brisbane._domainkey.football.example.com",
        "v=DKIM1; k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=",
    )));

    let outcome = verify_message(lib, "rfc8463", RFC8463_RAW_MESSAGE)
        .await
        .unwrap();

    assert!(matches!(outcome.verdict, Verdict::Pass));
    assert_eq!(outcome.signatures.len(), 1);
    assert!(outcome.signatures[0].passed);
    assert_eq!(
        outcome.signatures[0].signing_domain.as_deref(),
        Some("football.example.com")
    );
}

// RFC 8463 appendix A's "Joe SixPack" message, without the DKIM-Signature
// header, for re-signing with appendix A.3's private key.
const RFC8463_MESSAGE_FOR_SIGNING: &[u8] = b"From: Joe SixPack <joe@football.example.com>\r\n\
To: Suzie Q <suzie@shopping.example.net>\r\n\
Subject: Is dinner ready?\r\n\
Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)\r\n\
Message-ID: <20030712040037.46341.5F8J@football.example.com>\r\n\
\r\n\
Hi.\r\n\
\r\n\
We lost the game.  Are you hungry yet?\r\n\
\r\n\
Joe.\r\n";

#[tokio::test]
async fn rfc8463_signing_reproduces_published_golden_values() {
    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    sign_lib
        .set(ConfigKey::FixedTime, ConfigValue::Time(1528637909))
        .unwrap();
    // The published vector oversigns From/Subject/Date, each binding one
    // real occurrence plus one "must not recur" slot.
    sign_lib
        .set(
            ConfigKey::OversignHdrs,
            ConfigValue::HeaderList(vec![
                "From".to_string(),
                "Subject".to_string(),
                "Date".to_string(),
            ]),
        )
        .unwrap();

    let headers = sign_message(
        sign_lib,
        "rfc8463-sign",
        RFC8463_MESSAGE_FOR_SIGNING,
        &[SignRequest::new(
            include_bytes!("../test/keys/rfc8463.private.pem"),
            "brisbane",
            "football.example.com",
        )
        .with_auid("@football.example.com")
        .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)
        .with_hash_algo(crate::hash::HashAlgo::Ed25519Sha256)],
    )
    .await
    .unwrap();

    let value = headers[0].strip_prefix("DKIM-Signature: ").unwrap();
    let tagged = crate::header::TaggedHeader::parse(value).unwrap();
    assert_eq!(
        tagged.get_required_tag("bh"),
        "2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8="
    );
    assert_eq!(
        tagged.get_required_tag("b"),
        "/gCrinpcQOoIfuHNQIbq4pgh9kyIK3AQUdt9OdqQehSwhEIug4D11BusFa3bT3FY5OsU7ZbnKELq+eXdp1Q1Dw=="
    );

    let verify_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new().with_txt(
        "brisbane._domainkey.football.example.com",
        "v=DKIM1; k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=",
    )));
    let full_message = format!(
        "{}\r\n{}",
        headers[0],
        String::from_utf8_lossy(RFC8463_MESSAGE_FOR_SIGNING)
    );
    let outcome = verify_message(verify_lib, "rfc8463-sign-verify", full_message.as_bytes())
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Pass));
}

#[tokio::test]
async fn rfc8463_vector_body_hash_matches_published_value() {
    let lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new().with_txt(
        "brisbane._domainkey.football.example.com",
        "v=DKIM1; k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=",
    )));

    let mut ctx = Context::new_verify(lib, "rfc8463-bh");
    let (header_block, body) = crate::message::split_message(RFC8463_RAW_MESSAGE);
    for header in crate::message::split_headers(header_block) {
        ctx.header(&header).unwrap();
    }
    ctx.eoh().await.unwrap();
    ctx.body(body).unwrap();
    ctx.eom().await.unwrap();

    assert_eq!(
        ctx.signatures()[0].body_hash.as_deref(),
        Some("2jUSOH9NhtVGCQWNr9BrIAPreKQjO6Sn7XIkfJVOzv8=")
    );
}

#[tokio::test]
async fn dual_signature_rsa_and_ed25519_both_pass() {
    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    let message = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello there\r\n";

    let headers = sign_message(
        Arc::clone(&sign_lib),
        "dual-sign",
        message,
        &[
            SignRequest::new(rsa_key(), "s20", "example.com")
                .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed),
            SignRequest::new(ed25519_key(), "brisbane", "example.com")
                .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed),
        ],
    )
    .await
    .unwrap();
    assert_eq!(headers.len(), 2);

    let full_message = format!(
        "{}\r\n{}\r\n{}",
        headers[0],
        headers[1],
        String::from_utf8_lossy(message)
    );

    let ed_pub = {
        let pem = include_str!("../test/keys/ed.public.pem");
        let body: String = pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect::<Vec<_>>()
            .join("");
        body
    };

    let verify_lib = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new()
            .with_txt("s20._domainkey.example.com", rsa_pub_txt())
            .with_txt(
                "brisbane._domainkey.example.com",
                format!("v=DKIM1; k=ed25519; p={ed_pub}"),
            ),
    ));

    let outcome = verify_message(verify_lib, "dual-verify", full_message.as_bytes())
        .await
        .unwrap();

    assert!(matches!(outcome.verdict, Verdict::Pass));
    assert_eq!(outcome.signatures.len(), 2);
    assert!(outcome.signatures.iter().all(|s| s.passed));
}

#[tokio::test]
async fn tampering_with_body_after_signing_fails_verification() {
    let message = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello\r\n";

    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    let headers = sign_message(
        sign_lib,
        "tamper-sign",
        message,
        &[SignRequest::new(rsa_key(), "s20", "example.com")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)],
    )
    .await
    .unwrap();

    let tampered = format!("{}\r\nFrom: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nGoodbye\r\n", headers[0]);

    let verify_lib = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new().with_txt("s20._domainkey.example.com", rsa_pub_txt()),
    ));
    let outcome = verify_message(verify_lib, "tamper-verify", tampered.as_bytes())
        .await
        .unwrap();

    assert!(matches!(outcome.verdict, Verdict::Fail(_)));
    assert!(!outcome.signatures[0].passed);
}

#[tokio::test]
async fn ed25519_signature_against_rsa_key_record_fails_key_mismatch() {
    let message = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello\r\n";

    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    let headers = sign_message(
        sign_lib,
        "mismatch-sign",
        message,
        &[SignRequest::new(ed25519_key(), "s20", "example.com")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)],
    )
    .await
    .unwrap();

    let full_message = format!("{}\r\n{}", headers[0], String::from_utf8_lossy(message));

    // Advertise an RSA key under the same selector the Ed25519 signature
    // names, so the hash/key-family mismatch is caught at key-record
    // validation time rather than DNS resolution failing outright.
    let verify_lib = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new().with_txt("s20._domainkey.example.com", rsa_pub_txt()),
    ));
    let outcome = verify_message(verify_lib, "mismatch-verify", full_message.as_bytes())
        .await
        .unwrap();

    assert!(matches!(outcome.verdict, Verdict::Fail(_)));
    assert!(matches!(
        outcome.signatures[0].error,
        Some(crate::DKIMError::KeyMismatch)
    ));
}

#[tokio::test]
async fn length_cap_tolerates_appended_bytes_but_not_altered_prefix() {
    let message = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHi Alice\r\n";

    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    let headers = sign_message(
        sign_lib,
        "length-sign",
        message,
        &[SignRequest::new(rsa_key(), "s20", "example.com")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)
            .with_length_cap(5)],
    )
    .await
    .unwrap();
    assert!(headers[0].contains("l=5"));

    let verify_lib = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new().with_txt("s20._domainkey.example.com", rsa_pub_txt()),
    ));

    // Appending bytes past the signed prefix must not affect the verdict.
    let appended = format!(
        "{}\r\nFrom: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHi AliceEXTRA JUNK APPENDED\r\n",
        headers[0]
    );
    let outcome = verify_message(Arc::clone(&verify_lib), "length-verify-append", appended.as_bytes())
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Pass));

    // Altering a byte inside the signed prefix must break verification.
    let altered = format!(
        "{}\r\nFrom: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHo Alice\r\n",
        headers[0]
    );
    let outcome = verify_message(verify_lib, "length-verify-alter", altered.as_bytes())
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Fail(_)));
}

#[tokio::test]
async fn bare_lf_body_fails_without_fix_crlf_and_passes_with_it() {
    let original_body = b"Hi.\r\nWe lost the game.\r\n";
    let mangled_message =
        b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHi.\nWe lost the game.\n".to_vec();

    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    let headers = sign_message(
        Arc::clone(&sign_lib),
        "crlf-sign",
        &[
            b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\n".as_slice(),
            original_body,
        ]
        .concat(),
        &[SignRequest::new(rsa_key(), "s20", "example.com")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)],
    )
    .await
    .unwrap();

    let mangled_full = [headers[0].as_bytes(), b"\r\n", mangled_message.as_slice()].concat();

    let verify_lib_strict = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new().with_txt("s20._domainkey.example.com", rsa_pub_txt()),
    ));
    let outcome = verify_message(verify_lib_strict, "crlf-verify-strict", &mangled_full)
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Fail(_)));

    let verify_lib_fixed = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new().with_txt("s20._domainkey.example.com", rsa_pub_txt()),
    ));
    verify_lib_fixed
        .set(ConfigKey::Flags, ConfigValue::Flags(Flags::FIX_CRLF))
        .unwrap();
    let outcome = verify_message(verify_lib_fixed, "crlf-verify-fixed", &mangled_full)
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Pass));
}

#[tokio::test]
async fn oversigned_header_blocks_injection_of_a_second_occurrence() {
    let message = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello\r\n";

    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    sign_lib
        .set(
            ConfigKey::OversignHdrs,
            ConfigValue::HeaderList(vec!["Subject".to_string()]),
        )
        .unwrap();
    let headers = sign_message(
        Arc::clone(&sign_lib),
        "oversign-sign",
        message,
        &[SignRequest::new(rsa_key(), "s20", "example.com")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)],
    )
    .await
    .unwrap();
    // "Subject" appears twice in h=: once for the real header, once more
    // binding the non-existence of a second occurrence.
    assert_eq!(headers[0].matches("Subject").count(), 2);

    let verify_lib = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new().with_txt("s20._domainkey.example.com", rsa_pub_txt()),
    ));

    // The untouched message still verifies.
    let clean = format!("{}\r\n{}", headers[0], String::from_utf8_lossy(message));
    let outcome = verify_message(Arc::clone(&verify_lib), "oversign-verify-clean", clean.as_bytes())
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Pass));

    // An attacker prepending a second Subject header now has two actual
    // occurrences where the signature only ever bound one real value plus
    // one "must not exist" slot — the injected header consumes that slot
    // and changes the hashed input, so verification must fail.
    let attacked = format!(
        "{}\r\nSubject: injected\r\nFrom: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello\r\n",
        headers[0]
    );
    let outcome = verify_message(verify_lib, "oversign-verify-attacked", attacked.as_bytes())
        .await
        .unwrap();
    assert!(matches!(outcome.verdict, Verdict::Fail(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_contexts_verify_concurrently_without_cross_talk() {
    let message_a = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello from A\r\n";
    let message_b = b"From: Bob <bob@example.org>\r\nSubject: yo\r\n\r\nHello from B\r\n";

    let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
    let header_a = sign_message(
        Arc::clone(&sign_lib),
        "concurrent-sign-a",
        message_a,
        &[SignRequest::new(rsa_key(), "s20", "example.com")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)],
    )
    .await
    .unwrap();
    let header_b = sign_message(
        sign_lib,
        "concurrent-sign-b",
        message_b,
        &[SignRequest::new(rsa_key(), "s20", "example.org")
            .with_canonicalization(canonicalization::Type::Relaxed, canonicalization::Type::Relaxed)],
    )
    .await
    .unwrap();

    let full_a = format!("{}\r\n{}", header_a[0], String::from_utf8_lossy(message_a));
    let full_b = format!("{}\r\n{}", header_b[0], String::from_utf8_lossy(message_b));

    let verify_lib = Arc::new(LibraryHandle::with_file_driver(
        FileDriver::new()
            .with_txt("s20._domainkey.example.com", rsa_pub_txt())
            .with_txt("s20._domainkey.example.org", rsa_pub_txt()),
    ));

    let lib_a = Arc::clone(&verify_lib);
    let lib_b = Arc::clone(&verify_lib);
    let task_a = tokio::spawn(async move { verify_message(lib_a, "concurrent-verify-a", full_a.as_bytes()).await });
    let task_b = tokio::spawn(async move { verify_message(lib_b, "concurrent-verify-b", full_b.as_bytes()).await });

    let outcome_a = task_a.await.unwrap().unwrap();
    let outcome_b = task_b.await.unwrap().unwrap();

    assert!(matches!(outcome_a.verdict, Verdict::Pass));
    assert_eq!(outcome_a.signatures[0].signing_domain.as_deref(), Some("example.com"));
    assert!(matches!(outcome_b.verdict, Verdict::Pass));
    assert_eq!(outcome_b.signatures[0].signing_domain.as_deref(), Some("example.org"));
}

#[tokio::test]
async fn round_trip_matrix_covers_every_canon_and_algo_combination() {
    use crate::hash::HashAlgo;
    use canonicalization::Type::{Relaxed, Simple};

    let canon_combinations = [(Simple, Simple), (Simple, Relaxed), (Relaxed, Simple), (Relaxed, Relaxed)];
    let algos = [HashAlgo::RsaSha1, HashAlgo::RsaSha256, HashAlgo::Ed25519Sha256];

    let ed_pub_txt = {
        let pem = include_str!("../test/keys/ed.public.pem");
        let body: String = pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect::<Vec<_>>()
            .join("");
        format!("v=DKIM1; k=ed25519; p={body}")
    };

    for (header_canon, body_canon) in canon_combinations {
        for algo in algos {
            let message = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nHello there\r\n";
            let key: &[u8] = if algo == HashAlgo::Ed25519Sha256 { ed25519_key() } else { rsa_key() };

            let sign_lib = Arc::new(LibraryHandle::with_file_driver(FileDriver::new()));
            let headers = sign_message(
                sign_lib,
                "matrix-sign",
                message,
                &[SignRequest::new(key, "s20", "example.com")
                    .with_canonicalization(header_canon, body_canon)
                    .with_hash_algo(algo)],
            )
            .await
            .unwrap();

            let key_txt = if algo == HashAlgo::Ed25519Sha256 {
                ed_pub_txt.clone()
            } else {
                rsa_pub_txt()
            };
            let verify_lib = Arc::new(LibraryHandle::with_file_driver(
                FileDriver::new().with_txt("s20._domainkey.example.com", key_txt),
            ));
            let full_message = format!("{}\r\n{}", headers[0], String::from_utf8_lossy(message));
            let outcome = verify_message(verify_lib, "matrix-verify", full_message.as_bytes())
                .await
                .unwrap();

            assert!(
                matches!(outcome.verdict, Verdict::Pass),
                "canon {header_canon:?}/{body_canon:?} algo {algo:?} failed to round-trip"
            );
        }
    }
}
