//! Logical index space and the factory default of every record.

use core::ops::RangeInclusive;

/// File id of the device information and one-word settings sections.
pub const FILE_ID_SETTINGS: u16 = 0xAAAA;
/// File id of the color calibration section, temperatures included.
pub const FILE_ID_COLOR: u16 = 0xABBB;
/// File id of the manufacturer, user and reserved sections.
pub const FILE_ID_EXTENDED: u16 = 0xACCC;

/// Tag of a record holding its factory default.
pub const TAG_DEFAULT: u8 = 0xAA;
/// Tag of a record written by the application.
pub const TAG_CHANGED: u8 = 0xBB;

pub const FIRST_INDEX: u16 = 1;
pub const LAST_INDEX: u16 = 115;

/// Record key of a logical index.
pub const fn record_key(index: u16) -> u16 {
    0x1000 + index
}

/// Contiguous range of indices sharing a file id and a default table.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Section {
    DeviceInfo,
    DfuInfo,
    DeviceSettings,
    SystemStatus,
    SensorSettings,
    Colors,
    Manufacturer,
    User,
    Reserved,
}

impl Section {
    pub const ALL: [Section; 9] = [
        Section::DeviceInfo,
        Section::DfuInfo,
        Section::DeviceSettings,
        Section::SystemStatus,
        Section::SensorSettings,
        Section::Colors,
        Section::Manufacturer,
        Section::User,
        Section::Reserved,
    ];

    /// Section containing `index`, or `None` if the index is out of range.
    pub fn from_index(index: u16) -> Option<Section> {
        Section::ALL
            .into_iter()
            .find(|section| section.indices().contains(&index))
    }

    pub const fn indices(self) -> RangeInclusive<u16> {
        match self {
            Section::DeviceInfo => 1..=9,
            Section::DfuInfo => 10..=13,
            Section::DeviceSettings => 14..=16,
            Section::SystemStatus => 17..=20,
            Section::SensorSettings => 21..=29,
            Section::Colors => 30..=101,
            Section::Manufacturer => 102..=104,
            Section::User => 105..=105,
            Section::Reserved => 106..=115,
        }
    }

    pub const fn file_id(self) -> u16 {
        match self {
            Section::DeviceInfo
            | Section::DfuInfo
            | Section::DeviceSettings
            | Section::SystemStatus
            | Section::SensorSettings => FILE_ID_SETTINGS,
            Section::Colors => FILE_ID_COLOR,
            Section::Manufacturer | Section::User | Section::Reserved => FILE_ID_EXTENDED,
        }
    }
}

/// Source of record sizes and default payloads, keyed by logical index.
pub trait SectionCatalog {
    /// Payload size of `index` in bytes, without the tag byte.
    fn size_of(&self, index: u16) -> Option<usize>;

    /// Factory default payload of `index`. Its length equals `size_of(index)`.
    fn default_payload(&self, index: u16) -> Option<&[u8]>;
}

impl<C: SectionCatalog> SectionCatalog for &C {
    fn size_of(&self, index: u16) -> Option<usize> {
        (*self).size_of(index)
    }

    fn default_payload(&self, index: u16) -> Option<&[u8]> {
        (*self).default_payload(index)
    }
}

const WORD: usize = 4;
const BLOB: usize = 40;

// vendor model id, serial number, mac, name, model number, manufacturer name,
// hardware revision, firmware revision, factory calibration date
const DEVICE_INFO_SIZES: [usize; 9] = [4, 8, 6, 8, 8, 8, 8, 8, BLOB];

// unit number, calibration table, unit table
const MANUFACTURER_SIZES: [usize; 3] = [4, BLOB, BLOB];

const ZEROS: [u8; BLOB] = [0; BLOB];

const GREYSCALE: [f32; 9] = [
    13470.0, 567.0, 978.0, 2385.0, 13904.0, 3115.0, 691.0, 5997.0, 24399.0,
];

const COLOR_DEFAULTS: [f32; 72] = {
    let mother = [
        7.7585, 0.0, 0.0, 28.3045, 4.2323, -14.6471, 0.0, -7.4425, 3.0063, 7.7208, 0.0, 0.0,
        45.2001, 9.0369, -8.2718, 0.0, -10.9677, 3.7684, 0.1817, 0.0, 0.0, -4.2816, -7.2218,
        28.0945, 0.0, -19.3509, 15.1156, 4234.2494, 53965.9691, 8225.8053, 101305.0207,
        9817.7002, 136506.6339,
    ];
    let factory = [
        4838.6179, 205.1801, 353.4113, 828.6841, 4726.4440, 1065.9442, 242.7979, 2005.3778,
        8080.1176, 2.2685, 0.9983, 1.0014, 1.5041, 1.4465, 0.9148, 1.4414, 0.8635, 1.2148,
    ];

    let mut table = [0.0f32; 72];
    let mut i = 0;
    while i < 33 {
        table[i] = mother[i];
        i += 1;
    }
    let mut i = 0;
    while i < 18 {
        table[33 + i] = factory[i];
        i += 1;
    }
    let mut i = 0;
    while i < 9 {
        table[51 + i] = GREYSCALE[i];
        // 60 and 61 are the initial and final temperature
        table[62 + i] = GREYSCALE[i];
        i += 1;
    }
    // 71 is the user temperature
    table
};

const COLOR_PAYLOADS: [[u8; WORD]; 72] = {
    let mut payloads = [[0u8; WORD]; 72];
    let mut i = 0;
    while i < 72 {
        payloads[i] = COLOR_DEFAULTS[i].to_le_bytes();
        i += 1;
    }
    payloads
};

/// The factory tables compiled into the firmware.
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultCatalog;

impl SectionCatalog for DefaultCatalog {
    fn size_of(&self, index: u16) -> Option<usize> {
        let section = Section::from_index(index)?;
        let offset = (index - section.indices().start()) as usize;
        Some(match section {
            Section::DeviceInfo => DEVICE_INFO_SIZES[offset],
            Section::Manufacturer => MANUFACTURER_SIZES[offset],
            Section::User => BLOB,
            _ => WORD,
        })
    }

    fn default_payload(&self, index: u16) -> Option<&[u8]> {
        let section = Section::from_index(index)?;
        if section == Section::Colors {
            let offset = (index - section.indices().start()) as usize;
            return Some(&COLOR_PAYLOADS[offset]);
        }
        let size = self.size_of(index)?;
        Some(&ZEROS[..size])
    }
}
