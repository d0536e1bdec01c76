//! Boot reason integration tests

use std::sync::Arc;
use std::thread;

use nos_bootreason::sim::{SimBoard, SimPanicChain};
use nos_bootreason::*;
use proptest::prelude::*;

const LOG_BASE: u64 = 0x8000_0000;

struct Board {
    board: SimBoard,
    log: MappedRegion,
    beacon: MappedRegion,
}

fn board(log_size: usize) -> Board {
    let board = SimBoard::new();
    let log = board.add("brlog_mem", LOG_BASE, log_size);
    LogStore::provision(&log).unwrap();
    let beacon = board.add("imem,reset_reason", 0x0c26_465c, 4);
    board.add("imem,tz_reset_reason", 0x0c26_4660, 4);
    Board { board, log, beacon }
}

fn diagnostics(board: &Board) -> Diagnostics {
    Diagnostics::init(&board.board, &Config::default(), NoIrq).unwrap()
}

#[test]
fn test_init_from_provisioned_region() {
    let b = board(4096);
    let diag = diagnostics(&b);
    assert!(diag.is_ready());
    let header = diag.header().unwrap();
    assert_eq!(header.log_addr, LOG_BASE + HEADER_SIZE as u64);
    assert_eq!(header.log_size, 0);
    assert_eq!(b.board.attributes("brlog_mem"), Some(MapAttributes::log_buffer()));
    assert_eq!(b.board.attributes("imem,reset_reason"), Some(MapAttributes::register()));
}

#[test]
fn test_append_keeps_header_consistent() {
    let b = board(4096);
    let diag = diagnostics(&b);
    diag.append("first line\n").unwrap();
    brlog!(diag, "value={} state={:?}\n", 7, "ok").unwrap();

    let header = LogHeader::read_from(&b.log).unwrap();
    assert!(header.is_valid());
    assert_eq!(header.log_crc, checksum(HEADER_MAGIC, LOG_BASE + 64, header.log_size));
    assert_eq!(diag.log_text(), b"first line\n\rvalue=7 state=\"ok\"\n\r");
}

#[test]
fn test_overflow_discards_and_restarts() {
    let b = board(HEADER_SIZE + 100);
    let diag = diagnostics(&b);
    diag.append(&"a".repeat(70)).unwrap();
    diag.append(&"b".repeat(40)).unwrap();
    assert_eq!(diag.log_text(), "b".repeat(40).as_bytes());
    assert!(diag.header().unwrap().is_valid());
}

#[test]
fn test_uninitialized_region_aborts_init() {
    let board = SimBoard::new();
    let log = board.add("brlog_mem", LOG_BASE, 1024);
    board.add("imem,reset_reason", 0x0c26_465c, 4);
    board.add("imem,tz_reset_reason", 0x0c26_4660, 4);
    let result = Diagnostics::<NoIrq>::init(&board, &Config::default(), NoIrq);
    assert_eq!(result.err(), Some(Error::NotInitialized));
    assert!(log.to_vec().iter().all(|b| *b == 0));
}

#[test]
fn test_region_errors() {
    let board = SimBoard::new();
    assert_eq!(
        Diagnostics::<NoIrq>::init(&board, &Config::default(), NoIrq).err(),
        Some(Error::RegionNotFound("brlog_mem"))
    );

    board.add("brlog_mem", 0, 1024);
    assert_eq!(
        Diagnostics::<NoIrq>::init(&board, &Config::default(), NoIrq).err(),
        Some(Error::ZeroAddress("brlog_mem"))
    );

    board.add("brlog_mem", LOG_BASE, 0x20000);
    assert!(matches!(
        Diagnostics::<NoIrq>::init(&board, &Config::default(), NoIrq).err(),
        Some(Error::RegionInvalidSize { size: 0x20000, .. })
    ));
    assert_eq!(board.attributes("brlog_mem"), None);
}

#[test]
fn test_tz_beacon_must_map() {
    let board = SimBoard::new();
    LogStore::provision(&board.add("brlog_mem", LOG_BASE, 1024)).unwrap();
    board.add("imem,reset_reason", 0x0c26_465c, 4);
    board.add_unmappable("imem,tz_reset_reason", 0x0c26_4660, 4);
    assert_eq!(
        Diagnostics::<NoIrq>::init(&board, &Config::default(), NoIrq).err(),
        Some(Error::MapFailed("imem,tz_reset_reason"))
    );
}

#[test]
fn test_subsystem_failure_flow() {
    let b = board(4096);
    let diag = diagnostics(&b);
    diag.clear_magic();
    assert_eq!(diag.magic(), Some(ResetMagic::INIT));

    diag.record_subsystem_failure("modem crashed: err_qdi.c:1020", 64);
    assert_eq!(diag.set_subsystem_reason("adsp", RestartLevel::LocalRestart), None);
    assert_eq!(diag.magic(), Some(ResetMagic::INIT));

    assert_eq!(diag.set_subsystem_reason("modem", RestartLevel::SocWideReset), Some(ResetMagic::MODEM));
    assert_eq!(b.beacon.read_u32(0).unwrap(), 0x4D44_4F4D);

    let bytes = diag.snapshot();
    let snapshot = reader::parse(&bytes).unwrap();
    let lines: Vec<_> = snapshot.lines().flatten().collect();
    assert_eq!(lines, ["modem subsystem failure reason: modem crashed: err_qdi.c:1020."]);
}

#[test]
fn test_panic_hook_through_chain() {
    static SLOT: spin::Once<Diagnostics> = spin::Once::new();
    let b = board(4096);
    let chain = SimPanicChain::new();
    let diag = install(&SLOT, &b.board, &chain, &Config::default(), NoIrq, None).unwrap();
    assert_eq!(chain.len(), 1);

    diag.set_magic(ResetMagic::THERMAL);
    assert_eq!(chain.fire(&PanicEvent::new(0, Some("thermal"))), NotifyResult::Done);
    assert_eq!(diag.magic(), Some(ResetMagic::THERMAL));

    b.beacon.write_u32(0, 0).unwrap();
    chain.fire(&PanicEvent::new(0, None));
    assert_eq!(diag.magic(), Some(ResetMagic::PANIC));
}

#[test]
fn test_install_twice() {
    static SLOT: spin::Once<Diagnostics> = spin::Once::new();
    let b = board(4096);
    let chain = SimPanicChain::new();
    let cmdline = "console=ttyMSM0 androidboot.boot_reason=kernel_panic";
    install(&SLOT, &b.board, &chain, &Config::default(), NoIrq, Some(cmdline)).unwrap();
    assert_eq!(
        install(&SLOT, &b.board, &chain, &Config::default(), NoIrq, None).err(),
        Some(Error::AlreadyInstalled)
    );
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_install_with_refusing_chain() {
    static SLOT: spin::Once<Diagnostics> = spin::Once::new();
    let b = board(4096);
    let chain = SimPanicChain::refusing();
    assert_eq!(
        install(&SLOT, &b.board, &chain, &Config::default(), NoIrq, None).err(),
        Some(Error::RegistrationFailed)
    );
}

#[test]
fn test_oops_records_once() {
    static SYMBOLS: [(u64, u64, &str); 2] = [(0x1000, 0x100, "do_page_fault"), (0x2000, 0x80, "el1_da")];
    let b = board(4096);
    let diag = diagnostics(&b);
    let table = SymbolTable::new(&SYMBOLS);

    diag.arm_oops(true);
    assert!(diag.record_fault(0x1010, 0x2004, &table));
    assert!(!diag.record_fault(0x1010, 0x2004, &table));

    let text = String::from_utf8(diag.log_text()).unwrap();
    assert_eq!(
        text,
        "PC is at do_page_fault+0x10/0x100, [<0000000000001010>]\n\r\
         LR is at el1_da+0x4/0x80, [<0000000000002004>]\n\r"
    );
}

#[test]
fn test_concurrent_appends_do_not_interleave() {
    const THREADS: usize = 4;
    const LINES: usize = 50;

    let b = board(8192);
    let diag = Arc::new(diagnostics(&b));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let diag = Arc::clone(&diag);
            thread::spawn(move || {
                for n in 0..LINES {
                    brlog!(diag, "cpu{} line {:03}\n", t, n).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let bytes = diag.snapshot();
    let snapshot = reader::parse(&bytes).unwrap();
    assert!(snapshot.crc_valid);
    assert_eq!(snapshot.header.log_size as usize, THREADS * LINES * "cpu0 line 000\n\r".len());

    let lines: Vec<_> = snapshot.lines().map(Option::unwrap).collect();
    assert_eq!(lines.len(), THREADS * LINES);
    for t in 0..THREADS {
        let mine: Vec<_> = lines.iter().filter(|l| l.starts_with(&format!("cpu{} ", t))).collect();
        assert_eq!(mine.len(), LINES);
        for (n, line) in mine.iter().enumerate() {
            assert_eq!(**line, format!("cpu{} line {:03}", t, n));
        }
    }
}

#[test]
fn test_reader_flags_corrupt_checksum() {
    let b = board(1024);
    let diag = diagnostics(&b);
    diag.append("before reset\n").unwrap();
    let mut bytes = diag.snapshot();
    bytes[20] ^= 0x01;
    let snapshot = reader::parse(&bytes).unwrap();
    assert!(!snapshot.crc_valid);

    // The next boot refuses to extend a log it cannot trust.
    let next = SimBoard::new();
    let log = next.add("brlog_mem", LOG_BASE, 1024);
    log.write_bytes(0, &bytes).unwrap();
    next.add("imem,reset_reason", 0x0c26_465c, 4);
    next.add("imem,tz_reset_reason", 0x0c26_4660, 4);
    let diag = Diagnostics::<NoIrq>::init(&next, &Config::default(), NoIrq).unwrap();
    assert!(!diag.is_ready());
    assert_eq!(diag.append("lost\n"), Err(Error::NotReady));
}

#[test]
fn test_log_survives_reinit() {
    let b = board(1024);
    diagnostics(&b).append("boot 1\n").unwrap();
    let diag = diagnostics(&b);
    diag.append("boot 2\n").unwrap();
    let bytes = diag.snapshot();
    let lines: Vec<_> = reader::parse(&bytes).unwrap().lines().flatten().collect();
    assert_eq!(lines, ["boot 1", "boot 2"]);
}

proptest! {
    #[test]
    fn prop_log_size_tracks_appends(texts in proptest::collection::vec("[ -~]{0,300}", 1..30)) {
        let b = board(HEADER_SIZE + 512);
        let diag = diagnostics(&b);
        for text in &texts {
            diag.append(text).unwrap();
            let header = diag.header().unwrap();
            prop_assert!(header.is_valid());
            prop_assert!(header.log_size as usize <= 512);
        }
    }

    #[test]
    fn prop_magic_renders_ascii_or_decimal(raw in any::<u32>()) {
        let text = ResetMagic(raw).to_string();
        if raw < 128 {
            prop_assert_eq!(text, raw.to_string());
        } else {
            prop_assert!(text.len() <= 4);
            prop_assert!(text.bytes().all(|b| b.is_ascii_graphic()));
        }
    }
}
