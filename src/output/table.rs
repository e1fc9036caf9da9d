use colored::Colorize;
use serde_json::Value;

use crate::models::{PatientPayor, PayorDetails};

fn text<'a>(resource: &'a Value, pointer: &str) -> Option<&'a str> {
    resource.pointer(pointer).and_then(Value::as_str)
}

/// Display name for a Patient: `name[0].text`, else given names + family.
pub fn patient_name(patient: &Value) -> Option<String> {
    let name = patient.pointer("/name/0")?;
    if let Some(full) = name.get("text").and_then(Value::as_str) {
        return Some(full.to_string());
    }

    let mut parts: Vec<&str> = name
        .get("given")
        .and_then(Value::as_array)
        .map(|given| given.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if let Some(family) = name.get("family").and_then(Value::as_str) {
        parts.push(family);
    }

    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Format a patient list entry for TTY display.
pub fn format_patient_row(patient: &Value) -> String {
    let id = text(patient, "/id").unwrap_or("").dimmed().to_string();
    let name = patient_name(patient)
        .unwrap_or_else(|| "(unnamed)".to_string())
        .bold()
        .to_string();
    let born = text(patient, "/birthDate").unwrap_or("").dimmed().to_string();
    let gender = text(patient, "/gender").unwrap_or("");

    format!("{} {} {} {}", id, name, gender, born)
}

/// Format a single patient for TTY.
pub fn format_patient_detail(patient: &Value) -> String {
    let mut lines = Vec::new();

    let name = patient_name(patient).unwrap_or_else(|| "(unnamed)".to_string());
    lines.push(name.bold().to_string());
    lines.push("─".repeat(name.chars().count()));

    if let Some(id) = text(patient, "/id") {
        lines.push(format!("{}        {}", "ID:".dimmed(), id));
    }
    if let Some(gender) = text(patient, "/gender") {
        lines.push(format!("{}    {}", "Gender:".dimmed(), gender));
    }
    if let Some(born) = text(patient, "/birthDate") {
        lines.push(format!("{} {}", "Birthdate:".dimmed(), born));
    }
    if let Some(active) = patient.get("active").and_then(Value::as_bool) {
        lines.push(format!("{}    {}", "Active:".dimmed(), active));
    }
    if let Some(city) = text(patient, "/address/0/city") {
        let state = text(patient, "/address/0/state").unwrap_or("");
        lines.push(format!("{}      {} {}", "City:".dimmed(), city, state).trim_end().to_string());
    }

    lines.join("\n")
}

fn or_none(value: Option<&str>) -> String {
    value.unwrap_or("None").to_string()
}

fn format_payor(payor: &PayorDetails) -> String {
    [
        format!("  {}    {}", "ID:".dimmed(), or_none(payor.id.as_deref())),
        format!("  {}  {}", "Name:".dimmed(), or_none(payor.name.as_deref()).bold()),
        format!("  {}  {}", "Type:".dimmed(), or_none(payor.org_type.as_deref())),
        format!("  {} {}", "Phone:".dimmed(), or_none(payor.phone.as_deref())),
    ]
    .join("\n")
}

/// Format a payor lookup result for TTY.
pub fn format_patient_payor(result: &PatientPayor) -> String {
    let mut lines = vec![format!("Found {} payor(s):", result.payor_ids.len())];
    for payor in &result.payor_details {
        lines.push(String::new());
        lines.push(format_payor(payor));
    }
    lines.join("\n")
}
