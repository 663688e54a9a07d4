//! Industry categories in the order the predictor was trained on.

/// Number of one-hot slots.
pub const INDUSTRY_COUNT: usize = 47;

/// Ordered category names. Reordering this list breaks the model.
pub const INDUSTRIES: [&str; INDUSTRY_COUNT] = [
    "Stationary Combustion",
    "Electricity Generation",
    "Adipic Acid Production",
    "Aluminum Production",
    "Ammonia Manufacturing",
    "Cement Production",
    "Electronics Manufacture",
    "Ferroalloy Production",
    "Fluorinated GHG Production",
    "Glass Production",
    "HCFC-22 Production and HFC-23 Destruction",
    "Hydrogen Production",
    "Iron and Steel Production",
    "Lead Production",
    "Lime Production",
    "Magnesium Production",
    "Miscellaneous Use of Carbonates",
    "Nitric Acid Production",
    "Petrochemical Production",
    "Petroleum Refining",
    "Phosphoric Acid Production",
    "Pulp and Paper Manufacturing",
    "Silicon Carbide Production",
    "Soda Ash Manufacturing",
    "SF6 from Electrical Equipment",
    "Titanium Dioxide Production",
    "Underground Coal Mines",
    "Zinc Production",
    "Municipal Landfills",
    "Industrial Wastewater Treatment",
    "Industrial Waste Landfills",
    "Offshore Production",
    "Natural Gas Processing",
    "Natural Gas Transmission/Compression",
    "Underground Natural Gas Storage",
    "Liquified Natural Gas Storage",
    "Liquified Natural Gas Import/Export Equipment",
    "Petroleum Refinery (Producer)",
    "Petroleum Product Importer",
    "Petroleum Product Exporter",
    "Natural Gas Liquids Fractionator",
    "Natural Gas Local Distribution Company (supply)",
    "Non-CO2 Industrial Gas Supply",
    "Carbon Dioxide (CO2) Supply",
    "Import and Export of Equipment Containing Fluorinated GHGs",
    "Injection of Carbon Dioxide",
    "Electric Transmission and Distribution Equipment",
];

/// Slot of a category name, if known. Matching is exact after trimming.
#[must_use]
pub fn index_of(name: &str) -> Option<usize> {
    let name = name.trim();
    INDUSTRIES.iter().position(|known| *known == name)
}

/// One-hot encoding of a set of category names.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHot {
    /// `1.0` at every matched slot.
    pub vector: [f64; INDUSTRY_COUNT],
    /// Names that matched no slot.
    pub unknown: Vec<String>,
}

/// Encodes category names, warning about (and skipping) unknown ones.
#[must_use]
pub fn one_hot<S: AsRef<str>>(names: &[S]) -> OneHot {
    let mut vector = [0.0; INDUSTRY_COUNT];
    let mut unknown = Vec::new();

    for name in names {
        let name = name.as_ref();
        if let Some(idx) = index_of(name) {
            vector[idx] = 1.0;
        } else {
            log::warn!("Unknown industry category '{name}' ignored");
            unknown.push(name.to_string());
        }
    }

    OneHot { vector, unknown }
}
