//! Boot reason inspection tool
//!
//! Decodes a raw dump of the log region taken after reset, renders reset
//! magic values, and writes freshly provisioned region images for boards
//! whose earlier boot stage does not do it.

use std::fs;

use anyhow::{bail, Context, Result};
use nos_bootreason::reader::{self, Snapshot};
use nos_bootreason::sim::leak_region;
use nos_bootreason::{LogStore, PhysAddr, ResetMagic, HEADER_SIZE};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(err) = run(&args) {
        eprintln!("[bootreason-inspect] error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let task = args.first().map(String::as_str).unwrap_or("help");
    let rest = args.get(1..).unwrap_or(&[]);
    match task {
        "log" => show_log(rest),
        "magic" => show_magic(rest),
        "provision" => provision(rest),
        _ => {
            print_help();
            Ok(())
        }
    }
}

fn show_log(args: &[String]) -> Result<()> {
    let path = args.first().context("missing dump file")?;
    let bytes = fs::read(path).with_context(|| format!("reading {}", path))?;
    let snapshot = reader::parse(&bytes).with_context(|| format!("decoding {}", path))?;
    print!("{}", render_log(&snapshot));
    Ok(())
}

fn render_log(snapshot: &Snapshot<'_>) -> String {
    let header = &snapshot.header;
    let mut out = String::new();
    out.push_str(&format!("magic:       {:#010x}\n", header.magic));
    out.push_str(&format!("log_addr:    {:#x}\n", header.log_addr));
    out.push_str(&format!("log_size:    {}\n", header.log_size));
    out.push_str(&format!(
        "log_crc:     {:#010x} ({})\n",
        header.log_crc,
        if snapshot.crc_valid { "valid" } else { "MISMATCH" }
    ));
    let reason = ResetMagic(header.boot_reason);
    out.push_str(&format!("boot_reason: {}", reason));
    if let Some(text) = reason.describe() {
        out.push_str(&format!(" ({})", text));
    }
    out.push('\n');
    if !header.boot_reason_text().is_empty() {
        out.push_str(&format!("reason_str:  {}\n", header.boot_reason_text()));
    }
    if snapshot.is_truncated() {
        out.push_str("warning: log_size runs past the end of the dump\n");
    }
    out.push_str("---\n");
    for line in snapshot.raw_lines() {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out
}

fn show_magic(args: &[String]) -> Result<()> {
    let value = args.first().context("missing magic value")?;
    let raw: u32 = parse_number(value)?.try_into().context("magic does not fit in 32 bits")?;
    println!("{}", render_magic(ResetMagic(raw)));
    Ok(())
}

fn render_magic(magic: ResetMagic) -> String {
    let mut out = format!("{:#010x} {}", magic.raw(), magic);
    match magic.describe() {
        Some(text) => out.push_str(&format!(" ({})", text)),
        None if magic.is_bootloader_code() => out.push_str(" (bootloader code)"),
        None => out.push_str(" (unknown)"),
    }
    if magic.is_recognized() {
        out.push_str(" [kept on panic]");
    }
    out
}

fn provision(args: &[String]) -> Result<()> {
    let [out, size, rest @ ..] = args else {
        bail!("usage: provision <out> <size> [phys]");
    };
    let size = usize::try_from(parse_number(size)?).context("size too large")?;
    let phys = match rest.first() {
        Some(phys) => parse_number(phys)?,
        None => 0,
    };
    let image = provisioned_image(size, phys)?;
    fs::write(out, &image).with_context(|| format!("writing {}", out))?;
    println!("[bootreason-inspect] wrote {} bytes to {}", image.len(), out);
    Ok(())
}

fn provisioned_image(size: usize, phys: u64) -> Result<Vec<u8>> {
    if size <= HEADER_SIZE {
        bail!("region must be larger than the {}-byte header", HEADER_SIZE);
    }
    let region = leak_region(size, PhysAddr(phys));
    LogStore::provision(&region)?;
    Ok(region.to_vec())
}

fn parse_number(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.with_context(|| format!("invalid number: {}", text))
}

fn print_help() {
    println!(
        "bootreason-inspect usage:\n  \
         bootreason-inspect log <dump>\n  \
         bootreason-inspect magic <value>\n  \
         bootreason-inspect provision <out> <size> [phys]"
    );
}
