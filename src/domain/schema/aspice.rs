//! Item types follow the left side of the V-model: SYS.1 to SYS.3 and SWE.1
//! to SWE.3. Allowed link pairs point from the more detailed item to the more
//! abstract one (stakeholder → system → software).

use std::collections::BTreeSet;

use super::{ItemType, LinkType, TypePair};

/// Attribute keys every item may carry.
pub const EXTRA_OPTIONS: [&str; 5] = [
    "aspice_process",
    "safety_class",
    "verification_method",
    "priority",
    "rationale",
];

fn item_type(
    directive: &str,
    title: &str,
    prefix: &str,
    color: &str,
    style: &str,
    requires_traceability: bool,
) -> ItemType {
    ItemType {
        directive: directive.to_string(),
        title: title.to_string(),
        prefix: prefix.to_string(),
        style: Some(style.to_string()),
        color: Some(color.to_string()),
        requires_traceability,
    }
}

/// The six ASPICE item types.
///
/// Software detailed design is the bottom of the V and is not expected to be
/// refined further, so it is the only type without a traceability
/// requirement.
#[must_use]
pub fn item_types() -> Vec<ItemType> {
    vec![
        // SYS.1
        item_type("stkh_req", "Stakeholder Requirement", "STKH_REQ_", "#E3F2FD", "node", true),
        // SYS.2
        item_type("sys_req", "System Requirement", "SYS_REQ_", "#BBDEFB", "node", true),
        // SYS.3
        item_type("sys_arch", "System Architecture", "SYS_ARCH_", "#90CAF9", "artifact", true),
        // SWE.1
        item_type("sw_req", "Software Requirement", "SW_REQ_", "#C8E6C9", "node", true),
        // SWE.2
        item_type("sw_arch", "Software Architecture", "SW_ARCH_", "#A5D6A7", "artifact", true),
        // SWE.3
        item_type("sw_design", "Software Detailed Design", "SW_DESIGN_", "#81C784", "node", false),
    ]
}

fn pairs(pairs: &[(&str, &str)]) -> BTreeSet<TypePair> {
    pairs
        .iter()
        .map(|(source, target)| TypePair::new(*source, *target))
        .collect()
}

fn link_type(
    option: &str,
    incoming: &str,
    style: &str,
    color: &str,
    allowed: &[(&str, &str)],
    acyclic: bool,
) -> LinkType {
    LinkType {
        option: option.to_string(),
        incoming: incoming.to_string(),
        outgoing: option.replace('_', " "),
        style: Some(style.to_string()),
        color: Some(color.to_string()),
        allowed_pairs: Some(pairs(allowed)),
        acyclic,
        traceability: true,
    }
}

/// The four ASPICE traceability link types.
///
/// `derives_from` and `refines` express hierarchical refinement and must be
/// acyclic. `satisfies` and `traces_to` may cross-link parallel process
/// areas.
#[must_use]
pub fn link_types() -> Vec<LinkType> {
    vec![
        link_type(
            "satisfies",
            "is satisfied by",
            "bold",
            "#1565C0",
            &[("sys_req", "stkh_req")],
            false,
        ),
        link_type(
            "derives_from",
            "derives to",
            "solid",
            "#2E7D32",
            &[
                ("sys_req", "sys_req"),
                ("sys_arch", "sys_req"),
                ("sw_req", "sys_req"),
                ("sw_req", "sys_arch"),
                ("sw_req", "sw_req"),
                ("sw_arch", "sw_req"),
            ],
            true,
        ),
        link_type(
            "traces_to",
            "traced from",
            "dashed",
            "#6A1B9A",
            &[
                ("sw_req", "sys_arch"),
                ("sw_req", "sys_req"),
                ("sw_arch", "sys_arch"),
                ("sw_design", "sw_req"),
            ],
            false,
        ),
        link_type(
            "refines",
            "refined by",
            "solid",
            "#E65100",
            &[
                ("sys_arch", "sys_arch"),
                ("sw_arch", "sys_arch"),
                ("sw_arch", "sw_arch"),
                ("sw_design", "sw_arch"),
                ("sw_design", "sw_design"),
            ],
            true,
        ),
    ]
}

/// Default coverage rules as `(source, target)` directive pairs: which items
/// of `source` must reach at least one item of `target`.
#[must_use]
pub fn coverage_rules() -> Vec<TypePair> {
    vec![
        TypePair::new("sys_req", "stkh_req"),
        TypePair::new("sw_req", "sys_req"),
        TypePair::new("sw_arch", "sw_req"),
        TypePair::new("sw_design", "sw_arch"),
    ]
}
