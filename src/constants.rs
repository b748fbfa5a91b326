pub mod limits {

    /// Search runs listed by `stats`.
    pub const RECENT_SEARCH_RUNS: u64 = 10;

    /// Body characters shown per NOTAM in CLI listings.
    pub const LISTING_PREVIEW_CHARS: usize = 120;
}
