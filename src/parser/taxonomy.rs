//! Q-code taxonomy (ICAO Doc 8126).
//!
//! A Q-code such as `QMRLC` is a fixed leading `Q`, a two-letter subject
//! (`MR`, runway) and a two-letter condition (`LC`, closed). Subject and
//! condition are separate namespaces: `LC` is "Runway centre line lights" as
//! a subject but "Closed" as a condition, so each group is looked up in its
//! own table.

/// Prefix used for codes that are not in the table. The code itself is kept
/// so the stored text stays useful, e.g. `Unknown (QQ)`.
pub const UNKNOWN_MARKER: &str = "Unknown";

const SUBJECTS: &[(&str, &str)] = &[
    // Lighting facilities
    ("LA", "Approach lighting system"),
    ("LB", "Aerodrome beacon"),
    ("LC", "Runway centre line lights"),
    ("LD", "Landing direction indicator lights"),
    ("LE", "Runway edge lights"),
    ("LF", "Sequenced flashing lights"),
    ("LH", "High intensity runway lights"),
    ("LI", "Runway end identifier lights"),
    ("LJ", "Runway alignment indicator lights"),
    ("LK", "Category II components of approach lighting system"),
    ("LL", "Low intensity runway lights"),
    ("LM", "Medium intensity runway lights"),
    ("LP", "Precision approach path indicator"),
    ("LR", "All landing area lighting facilities"),
    ("LS", "Stopway lights"),
    ("LT", "Threshold lights"),
    ("LV", "Visual approach slope indicator system"),
    ("LW", "Heliport lighting"),
    ("LX", "Taxiway centre line lights"),
    ("LY", "Taxiway edge lights"),
    ("LZ", "Runway touchdown zone lights"),
    // Movement and landing area
    ("MA", "Movement area"),
    ("MB", "Bearing strength"),
    ("MC", "Clearway"),
    ("MD", "Declared distances"),
    ("MG", "Taxiing guidance system"),
    ("MH", "Runway arresting gear"),
    ("MK", "Parking area"),
    ("MM", "Daylight markings"),
    ("MN", "Apron"),
    ("MP", "Aircraft stands"),
    ("MR", "Runway"),
    ("MS", "Stopway"),
    ("MT", "Threshold"),
    ("MU", "Runway turning bay"),
    ("MW", "Strip"),
    ("MX", "Taxiway(s)"),
    // Facilities and services
    ("FA", "Aerodrome"),
    ("FB", "Braking action measurement equipment"),
    ("FC", "Ceiling measurement equipment"),
    ("FD", "Docking system"),
    ("FF", "Fire fighting and rescue"),
    ("FG", "Ground movement control"),
    ("FH", "Helicopter alighting area/platform"),
    ("FL", "Landing direction indicator"),
    ("FM", "Meteorological service"),
    ("FO", "Fog dispersal system"),
    ("FP", "Heliport"),
    ("FS", "Snow removal equipment"),
    ("FT", "Transmissometer"),
    ("FU", "Fuel availability"),
    ("FW", "Wind direction indicator"),
    ("FZ", "Customs"),
    // Communications and radar facilities
    ("CA", "Air/ground facility"),
    ("CE", "En route surveillance radar"),
    ("CG", "Ground controlled approach system"),
    ("CL", "Selective calling system (SELCAL)"),
    ("CM", "Surface movement radar"),
    ("CP", "Precision approach radar"),
    ("CR", "Surveillance radar element of precision approach system"),
    ("CS", "Secondary surveillance radar (SSR)"),
    ("CT", "Terminal area surveillance radar"),
    // Instrument and microwave landing systems
    ("ID", "DME associated with ILS"),
    ("IG", "ILS glide path"),
    ("II", "ILS inner marker"),
    ("IL", "ILS localiser"),
    ("IM", "ILS middle marker"),
    ("IO", "ILS outer marker"),
    ("IS", "ILS Category I"),
    ("IT", "ILS Category II"),
    ("IU", "ILS Category III"),
    ("IW", "Microwave landing system (MLS)"),
    ("IX", "ILS localiser outer"),
    ("IY", "ILS localiser middle"),
    // Terminal and en route navigation facilities
    ("NA", "All radio navigation facilities"),
    ("NB", "Non-directional radio beacon (NDB)"),
    ("NC", "DECCA"),
    ("ND", "Distance measuring equipment (DME)"),
    ("NF", "Fan marker"),
    ("NL", "Locator"),
    ("NM", "VOR/DME"),
    ("NN", "TACAN"),
    ("NO", "OMEGA"),
    ("NT", "VORTAC"),
    ("NV", "VOR"),
    ("NX", "Direction finding station"),
    // Airspace organisation
    ("AA", "Minimum altitude"),
    ("AC", "Class B, C, D or E surface area"),
    ("AD", "Air defence identification zone (ADIZ)"),
    ("AE", "Control area (CTA)"),
    ("AF", "Flight information region (FIR)"),
    ("AG", "General aviation area"),
    ("AH", "Upper control area (UTA)"),
    ("AI", "Initial approach fix"),
    ("AK", "Upper flight information region (UIR)"),
    ("AL", "Minimum usable flight level"),
    ("AM", "Military operating area (MOA)"),
    ("AN", "Terminal control area (TCA)"),
    ("AO", "Control zone (CTR)"),
    ("AP", "Reporting point"),
    ("AR", "RNAV route"),
    ("AT", "Terminal area"),
    ("AU", "Upper advisory area"),
    ("AV", "Upper advisory route"),
    ("AX", "Intermediate approach fix"),
    ("AZ", "Aerodrome traffic zone (ATZ)"),
    // Air traffic procedures
    ("PA", "Standard instrument arrival (STAR)"),
    ("PD", "Standard instrument departure (SID)"),
    ("PF", "Flow control procedure"),
    ("PH", "Holding procedure"),
    ("PI", "Instrument approach procedure"),
    ("PL", "Obstacle clearance limit"),
    ("PM", "Aerodrome operating minima"),
    ("PO", "Obstacle clearance altitude"),
    ("PP", "Obstacle clearance height"),
    ("PR", "Radio failure procedure"),
    ("PT", "Transition altitude"),
    ("PU", "Missed approach procedure"),
    ("PX", "Minimum holding altitude"),
    ("PZ", "ADIZ procedure"),
    // Airspace restrictions
    ("RA", "Airspace reservation"),
    ("RD", "Danger area"),
    ("RO", "Overflying"),
    ("RP", "Prohibited area"),
    ("RR", "Restricted area"),
    ("RT", "Temporary restricted area"),
    // Navigation warnings
    ("WA", "Air display"),
    ("WB", "Aerobatics"),
    ("WC", "Captive balloon or kite"),
    ("WD", "Demolition of explosives"),
    ("WE", "Exercises"),
    ("WF", "Air refuelling"),
    ("WG", "Glider flying"),
    ("WJ", "Banner/target towing"),
    ("WL", "Ascent of free balloon"),
    ("WM", "Missile, gun or rocket firing"),
    ("WP", "Parachute jumping exercise"),
    ("WS", "Burning or blowing gas"),
    ("WT", "Mass movement of aircraft"),
    ("WU", "Unmanned aircraft"),
    ("WV", "Formation flight"),
    ("WZ", "Model flying"),
    // Other information
    ("OA", "Aeronautical information service"),
    ("OB", "Obstacle"),
    ("OE", "Aircraft entry requirements"),
    ("OL", "Obstacle lights"),
    ("OR", "Rescue coordination centre"),
    ("XX", "Plain language"),
];

const CONDITIONS: &[(&str, &str)] = &[
    // Availability
    ("AC", "Withdrawn for maintenance"),
    ("AD", "Available for daylight operation"),
    ("AF", "Flight checked and found reliable"),
    ("AG", "Operating but ground checked only, awaiting flight check"),
    ("AH", "Hours of service are now"),
    ("AK", "Resumed normal operations"),
    ("AM", "Military operations only"),
    ("AN", "Available for night operation"),
    ("AO", "Operational"),
    ("AP", "Available, prior permission required"),
    ("AR", "Available on request"),
    ("AS", "Unserviceable"),
    ("AU", "Not available"),
    ("AW", "Completely withdrawn"),
    ("AX", "Previously promulgated shutdown cancelled"),
    // Changes
    ("CA", "Activated"),
    ("CC", "Completed"),
    ("CD", "Deactivated"),
    ("CE", "Erected"),
    ("CF", "Operating frequency changed to"),
    ("CG", "Downgraded to"),
    ("CH", "Changed"),
    ("CI", "Identification or radio call sign changed to"),
    ("CL", "Realigned"),
    ("CM", "Displaced"),
    ("CO", "Operating"),
    ("CP", "Operating on reduced power"),
    ("CR", "Temporarily replaced by"),
    ("CS", "Installed"),
    // Hazard conditions
    ("HA", "Braking action is"),
    ("HB", "Braking coefficient is"),
    ("HC", "Covered by compacted snow"),
    ("HD", "Covered by dry snow"),
    ("HE", "Covered by water"),
    ("HF", "Totally free of snow and ice"),
    ("HG", "Grass cutting in progress"),
    ("HH", "Hazard due to"),
    ("HI", "Covered by ice"),
    ("HJ", "Launch planned"),
    ("HK", "Migration in progress"),
    ("HL", "Snow clearance completed"),
    ("HM", "Marked by"),
    ("HN", "Covered by wet snow or slush"),
    ("HO", "Obscured by snow"),
    ("HP", "Snow clearance in progress"),
    ("HQ", "Operation cancelled"),
    ("HR", "Standing water"),
    ("HS", "Sanding in progress"),
    ("HT", "Approach according to signal area only"),
    ("HU", "Launch in progress"),
    ("HV", "Work completed"),
    ("HW", "Work in progress"),
    ("HX", "Concentration of birds"),
    ("HY", "Snow banks exist"),
    ("HZ", "Covered by frozen ruts and ridges"),
    // Limitations
    ("LA", "Operating on auxiliary power supply"),
    ("LB", "Reserved for aircraft based therein"),
    ("LC", "Closed"),
    ("LD", "Unsafe"),
    ("LE", "Operating without auxiliary power supply"),
    ("LF", "Interference from"),
    ("LG", "Operating without identification"),
    ("LH", "Unserviceable for aircraft heavier than"),
    ("LI", "Closed to IFR operations"),
    ("LK", "Operating as a fixed light"),
    ("LL", "Usable for length of ... and width of ..."),
    ("LN", "Closed to all night operations"),
    ("LP", "Prohibited to"),
    ("LR", "Aircraft restricted to runways and taxiways"),
    ("LS", "Subject to interruption"),
    ("LT", "Limited to"),
    ("LV", "Closed to VFR operations"),
    ("LW", "Will take place"),
    ("LX", "Operating but caution advised due to"),
    // Trigger NOTAM
    ("TT", "Trigger NOTAM"),
    ("XX", "Plain language"),
];

/// Condition codes meaning the subject is closed in some form.
pub const CLOSURE_CONDITIONS: &[&str] = &["LC", "LI", "LN", "LV"];

/// Condition codes that limit use of the subject without closing it.
pub const RESTRICTION_CONDITIONS: &[&str] = &["LP", "LR", "LT"];

/// Subject codes that are restricted, prohibited, danger or reserved airspace.
pub const RESTRICTION_SUBJECTS: &[&str] = &["RA", "RD", "RP", "RR", "RT", "WU"];

/// Condition code marking a trigger NOTAM.
pub const TRIGGER_CONDITION: &str = "TT";

/// The two decoded halves of a Q-code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedQCode {
    pub subject_code: String,
    pub condition_code: String,
    pub subject: String,
    pub condition: String,
}

impl DecodedQCode {
    #[must_use]
    pub fn is_known(&self) -> bool {
        !self.subject.starts_with(UNKNOWN_MARKER) && !self.condition.starts_with(UNKNOWN_MARKER)
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], code: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(code))
        .map(|(_, text)| *text)
}

fn unknown(code: &str) -> String {
    format!("{UNKNOWN_MARKER} ({code})")
}

#[must_use]
pub fn subject(code: &str) -> Option<&'static str> {
    lookup(SUBJECTS, code)
}

#[must_use]
pub fn condition(code: &str) -> Option<&'static str> {
    lookup(CONDITIONS, code)
}

/// Human-readable subject for a two-letter group, or the unknown marker.
#[must_use]
pub fn decode_subject(code: &str) -> String {
    subject(code).map_or_else(|| unknown(&code.to_ascii_uppercase()), str::to_string)
}

#[must_use]
pub fn decode_condition(code: &str) -> String {
    condition(code).map_or_else(|| unknown(&code.to_ascii_uppercase()), str::to_string)
}

/// Splits a five-letter Q-code into subject and condition groups.
#[must_use]
pub fn split(q_code: &str) -> Option<(&str, &str)> {
    let code = q_code.trim();
    if code.len() != 5 || !code.is_ascii() || !code.starts_with(['Q', 'q']) {
        return None;
    }
    Some((&code[1..3], &code[3..5]))
}

/// Decodes a Q-code. Returns `None` only when the code is not a five-letter
/// `Q....` group; unknown subject or condition groups decode to the unknown
/// marker instead of failing.
#[must_use]
pub fn decode(q_code: &str) -> Option<DecodedQCode> {
    let (subject_code, condition_code) = split(q_code)?;
    let subject_code = subject_code.to_ascii_uppercase();
    let condition_code = condition_code.to_ascii_uppercase();

    Some(DecodedQCode {
        subject: decode_subject(&subject_code),
        condition: decode_condition(&condition_code),
        subject_code,
        condition_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_runway_closed() {
        let decoded = decode("QMRLC").unwrap();
        assert_eq!(decoded.subject_code, "MR");
        assert_eq!(decoded.condition_code, "LC");
        assert_eq!(decoded.subject, "Runway");
        assert_eq!(decoded.condition, "Closed");
        assert!(decoded.is_known());
    }

    #[test]
    fn subject_and_condition_tables_are_independent() {
        assert_eq!(subject("LC"), Some("Runway centre line lights"));
        assert_eq!(condition("LC"), Some("Closed"));
        assert_eq!(decode_subject("mr"), "Runway");
        assert_eq!(decode_condition("zz"), "Unknown (ZZ)");
    }

    #[test]
    fn unknown_groups_decode_to_marker() {
        let decoded = decode("QQQZZ").unwrap();
        assert_eq!(decoded.subject, "Unknown (QQ)");
        assert_eq!(decoded.condition, "Unknown (ZZ)");
        assert!(!decoded.is_known());

        let half = decode("QRTZZ").unwrap();
        assert_eq!(half.subject, "Temporary restricted area");
        assert_eq!(half.condition, "Unknown (ZZ)");
    }

    #[test]
    fn rejects_codes_that_are_not_five_letters() {
        assert!(decode("QMRL").is_none());
        assert!(decode("XMRLC").is_none());
        assert!(decode("QMRLCX").is_none());
    }

    #[test]
    fn trigger_condition_is_in_table() {
        assert_eq!(condition(TRIGGER_CONDITION), Some("Trigger NOTAM"));
    }
}
