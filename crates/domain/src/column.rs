//! The fixed column whitelist for the `tox_data` table.
//!
//! Every identifier that ever reaches SQL text comes from [`Column`]; raw
//! request strings select columns only *by index* into [`Column::ALL`].

/// One exposed column of the toxicology table, in the fixed order clients
/// see (and sort by index against).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ChemicalName,
    ClassOfChemical,
    Lc50Mm,
    ExposureTime,
    MediaUsed,
    SampleSize,
    ConcRangeMm,
    Hardware,
    Source,
    SourceLink,
}

impl Column {
    /// Fixed exposed column order; also the sort-index basis.
    pub const ALL: [Column; 10] = [
        Column::ChemicalName,
        Column::ClassOfChemical,
        Column::Lc50Mm,
        Column::ExposureTime,
        Column::MediaUsed,
        Column::SampleSize,
        Column::ConcRangeMm,
        Column::Hardware,
        Column::Source,
        Column::SourceLink,
    ];

    /// Columns that accept per-column substring filters and participate in
    /// free-text search.
    pub const FILTERABLE: [Column; 6] = [
        Column::ChemicalName,
        Column::ClassOfChemical,
        Column::ExposureTime,
        Column::MediaUsed,
        Column::Hardware,
        Column::Source,
    ];

    /// Columns whose distinct values populate the filter-selection UI.
    pub const OPTIONS: [Column; 4] = [
        Column::ClassOfChemical,
        Column::ExposureTime,
        Column::MediaUsed,
        Column::Hardware,
    ];

    /// The SQL identifier. Only these strings are ever interpolated into
    /// query text.
    pub const fn as_str(self) -> &'static str {
        match self {
            Column::ChemicalName => "chemical_name",
            Column::ClassOfChemical => "class_of_chemical",
            Column::Lc50Mm => "lc50_mm",
            Column::ExposureTime => "exposure_time",
            Column::MediaUsed => "media_used",
            Column::SampleSize => "sample_size",
            Column::ConcRangeMm => "conc_range_mm",
            Column::Hardware => "hardware",
            Column::Source => "source",
            Column::SourceLink => "source_link",
        }
    }

    /// Select a sort column by index into [`Column::ALL`].
    ///
    /// Out-of-range indices fall back to the first column rather than
    /// erroring; bad query-string input must never surface.
    pub fn from_index(index: usize) -> Column {
        Column::ALL.get(index).copied().unwrap_or(Column::ALL[0])
    }

    pub fn is_filterable(self) -> bool {
        Column::FILTERABLE.contains(&self)
    }
}

/// Sort direction, restricted to the two SQL keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    /// Parse a request parameter; anything other than `desc` (any case)
    /// falls back to ascending.
    pub fn from_param(s: &str) -> SortDir {
        if s.eq_ignore_ascii_case("desc") {
            SortDir::Desc
        } else {
            SortDir::Asc
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}
