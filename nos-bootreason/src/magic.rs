//! Reset-reason magic codes
//!
//! A magic code is the single 32-bit word a downstream boot stage reads to
//! learn why the previous boot ended. Codes of 128 and above are four ASCII
//! characters in memory order; codes below 128 belong to the secondary
//! bootloader's own numbering.

use core::fmt;

/// A 32-bit reset-reason code
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ResetMagic(pub u32);

impl ResetMagic {
    /// Kernel panic with no more specific attribution (`PNIC`)
    pub const PANIC: Self = Self(0x4349_4E50);
    /// Watchdog bark (`WBRK`)
    pub const WDT_BARK: Self = Self(0x4B52_4257);
    /// Thermal shutdown (`THML`)
    pub const THERMAL: Self = Self(0x4C4D_4854);
    /// Reboot requested by the hypervisor (`VMRB`)
    pub const VMREBOOT: Self = Self(0x4252_4D56);
    /// Reboot requested from a command (`CMDB`)
    pub const CMD_REBOOT: Self = Self(0x4244_4D43);
    /// No reason recorded (`INIT`)
    pub const INIT: Self = Self(0x5449_4E49);
    /// IPA firmware (`IPAF`)
    pub const IPA_FWS: Self = Self(0x4641_5049);
    /// Video core (`VENS`)
    pub const VENUS: Self = Self(0x534E_4556);
    /// Secure processor (`SPSS`)
    pub const SPSS: Self = Self(0x5353_5053);
    /// GPU zap shader (`AZAP`)
    pub const AXXX_ZAP: Self = Self(0x5041_5A41);
    /// Sensor DSP (`SLPI`)
    pub const SLPI: Self = Self(0x4950_4C53);
    /// Audio DSP (`ADSP`)
    pub const ADSP: Self = Self(0x5053_4441);
    /// Compute DSP (`CDSP`)
    pub const CDSP: Self = Self(0x5053_4443);
    /// Wireless connectivity subsystem (`WCNS`)
    pub const WCNSS: Self = Self(0x534E_4357);
    /// Modem (`MODM`)
    pub const MODEM: Self = Self(0x4D44_4F4D);
    /// IPA microcontroller (`IPAU`)
    pub const IPA_UC: Self = Self(0x5541_5049);
    /// Application subsystem (`APSS`)
    pub const APSS: Self = Self(0x5353_5041);
    /// Computer vision subsystem (`CVPS`)
    pub const CVPSS: Self = Self(0x5350_5643);
    /// WLAN firmware (`WLAN`)
    pub const WLAN: Self = Self(0x4E41_4C57);
    /// External modem (`ESOC`)
    pub const ESOC: Self = Self(0x434F_5345);
    /// Neural processing unit (`NPU`)
    pub const NPU: Self = Self(0x0055_504E);
    /// Subsystem not in the reason table (`SUBS`)
    pub const SUBSYSTEM: Self = Self(0x5342_5553);
    /// Panic raised from user space (`USPA`)
    pub const USER_PANIC: Self = Self(0x4150_5355);

    /// Wrap a raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw 32-bit value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Codes below 128 are numbered by the secondary bootloader
    pub const fn is_bootloader_code(self) -> bool {
        self.0 < 128
    }

    /// The four bytes of the code in memory order
    pub const fn tag(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Whether the panic hook should leave this code in place
    pub fn is_recognized(self) -> bool {
        RECOGNIZED.contains(&self)
    }

    /// Human-readable reason for a known code
    pub fn describe(self) -> Option<&'static str> {
        let text = match self {
            Self::PANIC => "kernel panic",
            Self::WDT_BARK => "watchdog bark",
            Self::THERMAL => "thermal reset",
            Self::VMREBOOT => "vm reboot",
            Self::CMD_REBOOT => "command reboot",
            Self::INIT => "no reason recorded",
            Self::SUBSYSTEM => "unknown subsystem failure",
            Self::USER_PANIC => "user space panic",
            other => return subsystem_name(other),
        };
        Some(text)
    }
}

impl From<u32> for ResetMagic {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ResetMagic> for u32 {
    fn from(magic: ResetMagic) -> Self {
        magic.0
    }
}

impl fmt::Display for ResetMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bootloader_code() {
            return write!(f, "{}", self.0);
        }
        for byte in self.tag() {
            if byte == 0 {
                break;
            }
            let c = if byte.is_ascii_graphic() { byte as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResetMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResetMagic({:#010x} \"{}\")", self.0, self)
    }
}

/// How far a subsystem restart reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartLevel {
    /// The whole device resets; the beacon slot records the subsystem
    SocWideReset,
    /// The subsystem restarts in place; the beacon is left alone
    LocalRestart,
}

/// Subsystem name to magic code, first match wins
pub static SUBSYSTEM_REASONS: [(ResetMagic, &str); 15] = [
    (ResetMagic::MODEM, "modem"),
    (ResetMagic::ADSP, "adsp"),
    (ResetMagic::CDSP, "cdsp"),
    (ResetMagic::WLAN, "wlan"),
    (ResetMagic::VENUS, "venus"),
    (ResetMagic::WCNSS, "wcnss"),
    (ResetMagic::AXXX_ZAP, "a615_zap"),
    (ResetMagic::NPU, "npu"),
    (ResetMagic::IPA_FWS, "ipa_fws"),
    (ResetMagic::SPSS, "spss"),
    (ResetMagic::APSS, "apss"),
    (ResetMagic::CVPSS, "cvpss"),
    (ResetMagic::SLPI, "slpi"),
    (ResetMagic::IPA_UC, "ipa_uc"),
    (ResetMagic::ESOC, "esoc0"),
];

/// Codes that count as an attributed reset when a panic comes through
pub static RECOGNIZED: [ResetMagic; 21] = [
    ResetMagic::WDT_BARK,
    ResetMagic::THERMAL,
    ResetMagic::MODEM,
    ResetMagic::ADSP,
    ResetMagic::CDSP,
    ResetMagic::WLAN,
    ResetMagic::NPU,
    ResetMagic::VENUS,
    ResetMagic::SPSS,
    ResetMagic::WCNSS,
    ResetMagic::APSS,
    ResetMagic::CVPSS,
    ResetMagic::IPA_FWS,
    ResetMagic::AXXX_ZAP,
    ResetMagic::SLPI,
    ResetMagic::IPA_UC,
    ResetMagic::ESOC,
    ResetMagic::SUBSYSTEM,
    ResetMagic::VMREBOOT,
    ResetMagic::USER_PANIC,
    ResetMagic::PANIC,
];

/// Magic code for a subsystem name (exact match)
pub fn subsystem_magic(name: &str) -> Option<ResetMagic> {
    SUBSYSTEM_REASONS
        .iter()
        .find(|(_, subsystem)| *subsystem == name)
        .map(|(magic, _)| *magic)
}

/// Subsystem name for a magic code
pub fn subsystem_name(magic: ResetMagic) -> Option<&'static str> {
    SUBSYSTEM_REASONS
        .iter()
        .find(|(code, _)| *code == magic)
        .map(|(_, name)| *name)
}
