use time::{
    format_description::well_known::Rfc3339, Date, Month, OffsetDateTime, PrimitiveDateTime,
    Time, UtcOffset,
};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    to_primitive_utc(OffsetDateTime::now_utc())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

pub(crate) fn format_optional(value: Option<PrimitiveDateTime>) -> Option<String> {
    value.map(format_primitive)
}

/// A calendar month in UTC, used as the reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MonthWindow {
    pub(crate) start: PrimitiveDateTime,
    pub(crate) end: PrimitiveDateTime,
}

impl MonthWindow {
    pub(crate) fn containing(value: PrimitiveDateTime) -> Self {
        let date = value.date();
        let start = first_of_month(date.year(), date.month());
        let (next_year, next_month) = match date.month() {
            Month::December => (date.year() + 1, Month::January),
            month => (date.year(), month.next()),
        };
        let end = first_of_month(next_year, next_month);

        Self { start, end }
    }

    /// `YYYY-MM`
    pub(crate) fn key(&self) -> String {
        format!("{:04}-{:02}", self.start.year(), u8::from(self.start.month()))
    }

    /// `February 2026`
    pub(crate) fn display_name(&self) -> String {
        format!("{} {}", self.start.month(), self.start.year())
    }
}

fn first_of_month(year: i32, month: Month) -> PrimitiveDateTime {
    // Day 1 exists in every month of every representable year.
    let date = Date::from_calendar_date(year, month, 1).unwrap_or(Date::MIN);
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
}
