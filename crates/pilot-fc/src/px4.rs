//! PX4 custom mode packing: main mode in bits 16..24, sub mode in bits 24..32.

const MAIN_AUTO: u8 = 4;

const MODES: &[(&str, u8, u8)] = &[
    ("MANUAL", 1, 0),
    ("ALTCTL", 2, 0),
    ("POSCTL", 3, 0),
    ("AUTO.READY", MAIN_AUTO, 1),
    ("AUTO.TAKEOFF", MAIN_AUTO, 2),
    ("AUTO.LOITER", MAIN_AUTO, 3),
    ("AUTO.MISSION", MAIN_AUTO, 4),
    ("AUTO.RTL", MAIN_AUTO, 5),
    ("AUTO.LAND", MAIN_AUTO, 6),
    ("AUTO.FOLLOW_TARGET", MAIN_AUTO, 8),
    ("AUTO.PRECLAND", MAIN_AUTO, 9),
    ("ACRO", 5, 0),
    ("OFFBOARD", 6, 0),
    ("STABILIZED", 7, 0),
    ("RATTITUDE", 8, 0),
];

pub fn mode_name(custom_mode: u32) -> String {
    let main = ((custom_mode >> 16) & 0xff) as u8;
    let sub = ((custom_mode >> 24) & 0xff) as u8;

    MODES
        .iter()
        .find(|(_, m, s)| *m == main && (main != MAIN_AUTO || *s == sub))
        .map(|(name, _, _)| name.to_string())
        .unwrap_or_else(|| format!("CMODE({})", custom_mode))
}

/// (main, sub) for DO_SET_MODE, or None for a name PX4 does not know.
pub fn mode_params(name: &str) -> Option<(u8, u8)> {
    MODES.iter().find(|(n, _, _)| *n == name).map(|(_, m, s)| (*m, *s))
}

pub fn custom_mode(main: u8, sub: u8) -> u32 {
    ((main as u32) << 16) | ((sub as u32) << 24)
}
