//! Scene collections and the filters that narrow them.

use chrono::NaiveDate;
use serde::Serialize;

use crate::Area;

/// A filter applied to the scenes of a [`Collection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Keeps scenes whose footprint intersects the area.
    Bounds {
        /// Area of interest.
        area: Area,
    },
    /// Keeps scenes acquired in `[start, end)`.
    Date {
        /// Inclusive start.
        start: NaiveDate,
        /// Exclusive end.
        end: NaiveDate,
    },
    /// Keeps scenes acquired in the given calendar month (1-12) of any year.
    CalendarMonth {
        /// Month number.
        month: u32,
    },
    /// Keeps scenes whose numeric property is below `value`.
    PropertyLessThan {
        /// Property name.
        name: String,
        /// Exclusive upper bound.
        value: f64,
    },
}

/// A catalog collection with its filters, in application order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    /// Catalog identifier (e.g. `"MODIS/061/MOD11A1"`).
    pub id: String,
    /// Filters applied in order.
    pub filters: Vec<Filter>,
}

impl Collection {
    /// An unfiltered collection.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filters: Vec::new(),
        }
    }

    #[must_use]
    fn with(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Keeps scenes intersecting `area`.
    #[must_use]
    pub fn filter_bounds(self, area: Area) -> Self {
        self.with(Filter::Bounds { area })
    }

    /// Keeps scenes acquired in `[start, end)`.
    #[must_use]
    pub fn filter_date(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.with(Filter::Date { start, end })
    }

    /// Keeps scenes acquired in `month` of any year.
    #[must_use]
    pub fn filter_calendar_month(self, month: u32) -> Self {
        self.with(Filter::CalendarMonth { month })
    }

    /// Keeps scenes whose `name` property is below `value`.
    #[must_use]
    pub fn filter_property_lt(self, name: impl Into<String>, value: f64) -> Self {
        self.with(Filter::PropertyLessThan {
            name: name.into(),
            value,
        })
    }
}
