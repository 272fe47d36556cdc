//! USB ID lookup table - vendor and model names for labeling devices
//!
//! Names are only used for display and for name-based device selection.
//! The table never decides whether a device speaks the scale protocol.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Mettler Toledo vendor ID
pub const VENDOR_METTLER_TOLEDO: u16 = 0x0EB8;
/// Dymo-CoStar vendor ID
pub const VENDOR_DYMO: u16 = 0x0922;
/// X.J. Group (Stamps.com scales) vendor ID
pub const VENDOR_XJ_GROUP: u16 = 0x1446;
/// Fairbanks Scales vendor ID
pub const VENDOR_FAIRBANKS: u16 = 0x0B67;

/// Built-in (vendor, vendor name, [(product, model name)]) entries
const BUILTIN: &[(u16, &str, &[(u16, &str)])] = &[
    (
        VENDOR_METTLER_TOLEDO,
        "Mettler Toledo",
        &[(0xF000, "PS60 Scale")],
    ),
    (
        VENDOR_DYMO,
        "Dymo-CoStar Corp.",
        &[
            (0x8003, "M10 Digital Postal Scale"),
            (0x8004, "M25 Digital Postal Scale"),
        ],
    ),
    (
        VENDOR_XJ_GROUP,
        "X.J.GROUP",
        &[(0x6A73, "Stamps.com Model 510 5LB Scale")],
    ),
    (
        VENDOR_FAIRBANKS,
        "Fairbanks Scales",
        &[(0x555E, "SCB-R9000 Scale")],
    ),
];

/// One vendor's entry in the lookup table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorEntry {
    /// Vendor name, if known
    pub name: Option<String>,
    /// Product ID to model name
    pub products: BTreeMap<u16, String>,
}

/// Vendor/product name table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbIds {
    vendors: HashMap<u16, VendorEntry>,
}

impl UsbIds {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding the built-in scale entries
    pub fn builtin() -> Self {
        let mut ids = Self::new();
        for (vid, vendor, products) in BUILTIN {
            ids.set_vendor_name(*vid, vendor);
            for (pid, model) in products.iter() {
                ids.set_product_name(*vid, *pid, model);
            }
        }
        ids
    }

    /// Set (or replace) a vendor's name
    pub fn set_vendor_name(&mut self, vid: u16, name: &str) {
        self.vendors.entry(vid).or_default().name = Some(name.to_string());
    }

    /// Set (or replace) a product's model name
    pub fn set_product_name(&mut self, vid: u16, pid: u16, name: &str) {
        self.vendors
            .entry(vid)
            .or_default()
            .products
            .insert(pid, name.to_string());
    }

    /// Look up a vendor name
    pub fn vendor_name(&self, vid: u16) -> Option<&str> {
        self.vendors.get(&vid).and_then(|v| v.name.as_deref())
    }

    /// Look up a model name
    pub fn product_name(&self, vid: u16, pid: u16) -> Option<&str> {
        self.vendors
            .get(&vid)
            .and_then(|v| v.products.get(&pid))
            .map(String::as_str)
    }

    /// Number of vendors in the table
    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

static USB_IDS: OnceLock<UsbIds> = OnceLock::new();

/// Get the process-wide built-in lookup table
pub fn usb_ids() -> &'static UsbIds {
    USB_IDS.get_or_init(UsbIds::builtin)
}
