use proptest::prelude::*;
use resinkit_communication::firmware::chitu::response_parser::{
    parse_sd_status, ChituResponseParser, ProgressReport, ResponseUpdate, RewriteKind, SdStatus,
    BUSY_RESPONSE,
};
use resinkit_communication::firmware::chitu::PrinterStateMachine;
use resinkit_core::PrinterState;

fn parser() -> ChituResponseParser {
    ChituResponseParser::new("M4000")
}

#[test]
fn test_typical_chitu_session() {
    let parser = parser();
    let cases = [
        ("ok N:0\r\n", "M4002", "ok N:0"),
        ("wait\r\n", "M4000", BUSY_RESPONSE),
        (
            "ZWLF make it. Date:Jan  8 2020",
            "M115",
            "FIRMWARE_NAME:ZWLF made it PROTOCOL_VERSION:V4.13. Date:Jan  8 2020",
        ),
        ("ok V4.13", "M6030 'cube.ctb'", "ok start V4.13"),
        ("SD printing byte 4096/65536", "M27", "SD printing byte 4096/65536"),
    ];

    for (raw, command, expected) in cases {
        assert_eq!(parser.process(raw, command, "V4.13").text, expected, "raw: {:?}", raw);
    }
}

#[test]
fn test_storage_status_reply_is_parsed() {
    let parsed = parser().process("Not SD printing", "M27", "V4.13");
    assert_eq!(
        parsed.updates,
        vec![ResponseUpdate::StorageStatus(SdStatus::NotPrinting)]
    );
    assert_eq!(
        parse_sd_status("SD printing byte 7/9"),
        Some(SdStatus::Printing {
            current: 7,
            total: 9
        })
    );
}

proptest! {
    #[test]
    fn busy_rewrite_is_idempotent(suffix in "[ -~]{0,40}") {
        let parser = parser();
        let once = parser.process(&format!("wait{}", suffix), "M4000", "V4.13");
        prop_assert_eq!(once.text.as_str(), BUSY_RESPONSE);
        prop_assert_eq!(once.rewrite, Some(RewriteKind::Busy));

        let twice = parser.process(&once.text, "M4000", "V4.13");
        prop_assert_eq!(twice.text, once.text);
    }

    #[test]
    fn vendor_identifier_becomes_firmware_name(
        prefix in "[ -~]{0,20}",
        suffix in "[ -~]{0,20}",
        vendor in prop::sample::select(vec!["CBD", "ZWLF"]),
        version in "V[0-9]\\.[0-9]{1,2}",
    ) {
        let line = format!("{}{} make it{}", prefix, vendor, suffix);
        prop_assume!(!line.trim().starts_with("wait"));

        let parsed = parser().process(&line, "M115", &version);
        let expected = format!("FIRMWARE_NAME:{} made it PROTOCOL_VERSION:{}", vendor, version);
        prop_assert!(parsed.text.contains(&expected), "{:?} -> {:?}", line, parsed.text);
        prop_assert_eq!(parsed.rewrite, Some(RewriteKind::VendorIdentifier));
    }

    #[test]
    fn progress_report_drives_state(
        current in 0u64..100_000,
        total in 1u64..100_000,
        paused in any::<bool>(),
    ) {
        let line = format!(
            "ok B:0/0 X:0.000 Y:0.000 Z:1.500 F:0/0 D:{}/{}/{}",
            current,
            total,
            u8::from(paused)
        );
        let parsed = parser().process(&line, "M4000", "V4.13");
        let report = ProgressReport { current, total, paused };

        prop_assert_eq!(&parsed.text, &format!("SD printing byte {}/{}", current, total));
        prop_assert!(parsed.updates.contains(&ResponseUpdate::Progress(report)));
        let expected_position = ResponseUpdate::Position { z: 1.5 };
        prop_assert!(parsed.updates.contains(&expected_position));

        let mut machine = PrinterStateMachine::new("V4.13");
        machine.mark_connected();
        for update in &parsed.updates {
            machine.apply_update(update);
        }

        let expected_percent = (current as f64 / total as f64 * 100.0).min(100.0);
        prop_assert!((machine.status().progress_percent - expected_percent).abs() < 1e-9);
        prop_assert!(machine.status().progress_percent <= 100.0);

        let expected_state = if paused && current > 0 {
            PrinterState::Paused
        } else if current >= total {
            PrinterState::Finished
        } else if current > 0 {
            PrinterState::Printing
        } else {
            PrinterState::Idle
        };
        prop_assert_eq!(machine.state(), expected_state);
        prop_assert_eq!(machine.z_position(), 1.5);
    }

    #[test]
    fn output_is_trimmed_printable_text(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
        let text: String = raw.iter().map(|&b| char::from(b)).collect();
        let parsed = parser().process(&text, "M25", "V4.13");

        prop_assert!(parsed
            .text
            .chars()
            .all(|c| matches!(c, ' '..='~' | '\r' | '\n' | '\t')));
        prop_assert_eq!(parsed.text.trim(), parsed.text.as_str());
    }
}
