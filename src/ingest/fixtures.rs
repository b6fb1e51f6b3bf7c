/// Test fixtures: observation exports in the CSV layout read by
/// `ingest::observations`, cfg(test) gated.
///
/// Export shape:
///   collection_time,gauge,sensor,value
///
///   collection_time — `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339
///   gauge           — numeric gauge code
///   sensor          — `rain`, `lake_level`, or any other label
///   value           — number, or a no-data marker: empty, whitespace,
///                     a non-breaking space (U+00A0) or `---`
///
/// The scraped source pages render "no data" as a non-breaking space, so
/// exports carry it verbatim.

/// A handful of rows covering every no-data marker and both timestamp
/// formats.
#[cfg(test)]
pub(crate) fn fixture_markers_csv() -> &'static str {
    "collection_time,gauge,sensor,value\n\
     2015-05-23 00:00:00,4594,rain,0.25\n\
     2015-05-23 00:00:00,3991,rain,\u{a0}\n\
     2015-05-23 00:00:00,3948,rain,\n\
     2015-05-23 00:00:00,3448,rain,---\n\
     2015-05-23 00:00:00,3237,rain,   \n\
     2015-05-23T01:00:00Z,3963,lake_level,660.43\n\
     2015-05-23 01:00:00,3963,stage,12.1\n"
}

/// Ten hours of a small storm over two lakes and three rain gauges.
///
/// System-wide max rain per hour is
/// `[0.0, 0.2, 1.5, 1.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]`. With no leading
/// window and a 2 h trailing window the moving sums are
/// `[0.0, 0.2, 1.7, 2.7, 2.6, 1.1, 0.1, 0.0, 0.0, 0.0]`, so threshold 2.0
/// yields exactly one storm, 03:00 → 05:00.
///
/// Inside that storm:
/// - 4594 totals 1.1 in (1.0 + 0.1 + 0.0)
/// - 3948 measured 0.0 (a real zero)
/// - 3991 has only no-data markers (absent)
/// - 3963 ranges 660.5 .. 661.0 ft; 2958 reads 825.3 ft once
#[cfg(test)]
pub(crate) fn fixture_storm_csv() -> &'static str {
    "collection_time,gauge,sensor,value\n\
     2015-05-23 00:00:00,4594,rain,0.0\n\
     2015-05-23 01:00:00,4594,rain,0.2\n\
     2015-05-23 02:00:00,4594,rain,1.5\n\
     2015-05-23 02:00:00,3991,rain,0.4\n\
     2015-05-23 03:00:00,4594,rain,1.0\n\
     2015-05-23 03:00:00,3991,rain,\u{a0}\n\
     2015-05-23 03:00:00,3963,lake_level,660.5\n\
     2015-05-23 04:00:00,4594,rain,0.1\n\
     2015-05-23 04:00:00,3991,rain,\n\
     2015-05-23 04:00:00,3948,rain,0.0\n\
     2015-05-23 04:00:00,3963,lake_level,660.9\n\
     2015-05-23 04:00:00,3963,stage,12.0\n\
     2015-05-23 04:00:00,2958,lake_level,825.3\n\
     2015-05-23 05:00:00,4594,rain,0.0\n\
     2015-05-23 05:00:00,3991,rain,---\n\
     2015-05-23 05:00:00,3963,lake_level,661.0\n\
     2015-05-23 06:00:00,4594,rain,0.0\n\
     2015-05-23 07:00:00,4594,rain,0.0\n\
     2015-05-23 08:00:00,4594,rain,0.0\n\
     2015-05-23 08:00:00,3963,lake_level,662.0\n\
     2015-05-23 09:00:00,4594,rain,0.0\n"
}

/// Gauge catalog matching `fixture_storm_csv`. Travis has a volume table
/// at `Travis.txt` relative to the catalog directory; Wirtz has none.
#[cfg(test)]
pub(crate) fn fixture_storm_catalog_toml() -> &'static str {
    r#"
    [[gauge]]
    code = "4594"
    name = "Driftwood 4 SSE"
    role = "rain"

    [[gauge]]
    code = "3991"
    name = "Jollyville 2 SW"
    role = "rain"

    [[gauge]]
    code = "3948"
    name = "Lakeway 2 E"
    role = "rain"

    [[gauge]]
    code = "3963"
    name = "Mansfield Dam"
    role = "lake"
    volume_table = "Travis.txt"

    [[gauge]]
    code = "2958"
    name = "Wirtz Dam"
    role = "lake"
    "#
}

/// Lake Travis elevation→volume rows around the fixture storm levels.
#[cfg(test)]
pub(crate) fn fixture_travis_volume_csv() -> &'static str {
    "ft-MSL,acre-feet\n\
     660.4,1055000\n\
     660.5,1057500\n\
     660.9,1067500\n\
     661.0,1070000\n"
}
