// ── Control surface layout ──
//
// Pure generation of a paginated control surface from the current paired
// population: a directory page listing every device, then one command
// page per model group. No I/O here; the host renders pages and feeds
// activated `ControlAction`s straight to the dispatcher.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::{presets, Command};
use crate::model::{DeviceRecord, ModelCode, PanelId};

/// One page of the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub controls: Vec<Control>,
}

/// One row on a page. Rows without an action are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub action: Option<ControlAction>,
}

/// A command bound to the devices it addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlAction {
    pub command: Command,
    pub targets: Vec<PanelId>,
}

impl Control {
    fn label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: None,
        }
    }

    fn action(label: impl Into<String>, command: Command, targets: Vec<PanelId>) -> Self {
        Self {
            label: label.into(),
            action: Some(ControlAction { command, targets }),
        }
    }
}

/// How many effect shortcuts a page carries at most.
const MAX_EFFECT_CONTROLS: usize = 4;

/// Generate the control surface for the given population.
///
/// Only paired devices participate. Output is fully deterministic: model
/// groups are ordered by size (largest first) then SKU, members by id.
/// A population of at most one device, or of a single model, collapses
/// to exactly two pages: the directory and one combined command page.
pub fn generate(records: &[Arc<DeviceRecord>]) -> Vec<Page> {
    let mut paired: Vec<&DeviceRecord> = records
        .iter()
        .map(AsRef::as_ref)
        .filter(|r| r.is_paired())
        .collect();
    paired.sort_by(|a, b| a.id.cmp(&b.id));

    let mut by_model: BTreeMap<ModelCode, Vec<&DeviceRecord>> = BTreeMap::new();
    for record in &paired {
        by_model.entry(record.model.clone()).or_default().push(record);
    }
    let mut groups: Vec<(ModelCode, Vec<&DeviceRecord>)> = by_model.into_iter().collect();
    groups.sort_by_key(|(model, members)| (Reverse(members.len()), model.clone()));

    let mut pages = vec![directory_page(&paired, &groups)];
    if paired.len() <= 1 || groups.len() <= 1 {
        let title = groups
            .first()
            .map_or_else(|| "Controls".to_owned(), |(model, _)| group_title(model));
        pages.push(command_page("controls", title, &paired));
    } else {
        for (model, members) in &groups {
            pages.push(command_page(
                format!("model-{}", model.sku().to_lowercase()),
                group_title(model),
                members,
            ));
        }
    }
    pages
}

fn group_title(model: &ModelCode) -> String {
    if model.is_unknown() {
        model.family().display_name().to_owned()
    } else {
        format!("{} ({})", model.family().display_name(), model.sku())
    }
}

fn directory_page(paired: &[&DeviceRecord], groups: &[(ModelCode, Vec<&DeviceRecord>)]) -> Page {
    let mut controls = Vec::new();
    for (model, members) in groups {
        controls.push(Control::label(group_title(model)));
        for member in members {
            let label = if member.panel_count > 0 {
                format!("{} ({}p)", member.name, member.panel_count)
            } else {
                member.name.clone()
            };
            controls.push(Control::label(label));
        }
    }

    if paired.len() > 1 {
        let all: Vec<PanelId> = paired.iter().map(|r| r.id.clone()).collect();
        controls.push(Control::action("All On", Command::SetPower(true), all.clone()));
        controls.push(Control::action("All Off", Command::SetPower(false), all));
    }

    Page {
        id: "directory".to_owned(),
        title: "Devices".to_owned(),
        controls,
    }
}

fn command_page(id: impl Into<String>, title: String, members: &[&DeviceRecord]) -> Page {
    let all: Vec<PanelId> = members.iter().map(|r| r.id.clone()).collect();
    let mut controls = vec![
        Control::action("On", Command::SetPower(true), all.clone()),
        Control::action("Off", Command::SetPower(false), all.clone()),
        Control::action("Toggle", Command::Toggle, all.clone()),
        Control::action("25%", Command::SetBrightness(25), all.clone()),
        Control::action("50%", Command::SetBrightness(50), all.clone()),
        Control::action("75%", Command::SetBrightness(75), all.clone()),
        Control::action("100%", Command::SetBrightness(100), all.clone()),
        Control::action("Red", presets::RED, all.clone()),
        Control::action("Green", presets::GREEN, all.clone()),
        Control::action("Blue", presets::BLUE, all.clone()),
        Control::action("White", presets::WHITE, all.clone()),
    ];

    if members
        .iter()
        .any(|r| r.capabilities.is_some_and(|c| c.color_temp))
    {
        controls.push(Control::action(
            "Warm",
            Command::SetColorTemp(presets::WARM_KELVIN),
            all.clone(),
        ));
        controls.push(Control::action(
            "Cool",
            Command::SetColorTemp(presets::COOL_KELVIN),
            all.clone(),
        ));
    }

    for effect in shared_effects(members) {
        let targets: Vec<PanelId> = members
            .iter()
            .filter(|r| r.effects.iter().any(|e| *e == effect))
            .map(|r| r.id.clone())
            .collect();
        controls.push(Control::action(
            effect.clone(),
            Command::SetEffect(effect),
            targets,
        ));
    }

    controls.push(Control::action("Identify", Command::Identify, all));

    Page {
        id: id.into(),
        title,
        controls,
    }
}

/// Order-preserving union of member effect catalogs, capped.
fn shared_effects(members: &[&DeviceRecord]) -> Vec<String> {
    let mut effects = Vec::new();
    for member in members {
        for effect in &member.effects {
            if !effects.contains(effect) {
                effects.push(effect.clone());
                if effects.len() == MAX_EFFECT_CONTROLS {
                    return effects;
                }
            }
        }
    }
    effects
}
