// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed role permission table.
//!
//! Maps `(role, section, optional subsection)` to the set of actions the UI
//! may offer. Evaluation is a pure lookup.

use std::collections::{BTreeSet, HashMap};

use super::roles::Role;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Scope {
    role: Role,
    section: String,
    subsection: Option<String>,
}

impl Scope {
    fn new(role: Role, section: &str, subsection: Option<&str>) -> Self {
        Self {
            role,
            section: section.to_string(),
            subsection: subsection.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    entries: HashMap<Scope, BTreeSet<String>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add actions to a scope.
    pub fn grant(
        &mut self,
        role: Role,
        section: &str,
        subsection: Option<&str>,
        actions: &[&str],
    ) -> &mut Self {
        self.entries
            .entry(Scope::new(role, section, subsection))
            .or_default()
            .extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn actions(
        &self,
        role: Role,
        section: &str,
        subsection: Option<&str>,
    ) -> Option<&BTreeSet<String>> {
        self.entries.get(&Scope::new(role, section, subsection))
    }

    pub fn allows(&self, role: Role, section: &str, subsection: Option<&str>, action: &str) -> bool {
        self.actions(role, section, subsection)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Sections a role can see anything in.
    pub fn sections(&self, role: Role) -> BTreeSet<&str> {
        self.entries
            .keys()
            .filter(|scope| scope.role == role)
            .map(|scope| scope.section.as_str())
            .collect()
    }

    /// The fee portal's shipped permission data.
    pub fn fee_portal_defaults() -> Self {
        let mut table = Self::new();
        let admin = Role::Admin;
        let accountant = Role::Accountant;
        let student = Role::Student;

        table
            .grant(admin, "dashboard", None, &["view_stats", "view_notifications", "view_logs"])
            .grant(admin, "institute_profile", None, &["view", "edit", "upload_logo", "update_bank_details"])
            .grant(admin, "users", Some("students"), &["view", "add", "edit", "delete", "import_bulk", "export_data"])
            .grant(admin, "users", Some("accountants"), &["view", "add", "edit", "delete"])
            .grant(admin, "users", Some("admins"), &["view"])
            .grant(admin, "fee_management", Some("fee_structures"), &["create", "edit", "delete", "view", "assign_to_class"])
            .grant(admin, "fee_management", Some("fee_collections"), &["view", "generate_invoice", "mark_paid", "mark_unpaid", "refund", "partial_payment"])
            .grant(admin, "fee_management", Some("discounts"), &["create", "edit", "assign", "remove"])
            .grant(admin, "fee_management", Some("fine_management"), &["add", "edit", "remove"])
            .grant(admin, "fee_management", Some("payment_modes"), &["configure", "disable", "enable"])
            .grant(admin, "transactions", None, &["view_all", "filter_by_class", "download_report", "view_receipt", "edit_transaction", "delete_transaction"])
            .grant(admin, "announcements", None, &["create", "edit", "delete", "send_to_roles"])
            .grant(admin, "reports", None, &["generate_fee_report", "generate_student_report", "export_csv", "export_pdf"])
            .grant(admin, "notifications", None, &["send_sms", "send_email", "send_inapp", "configure_templates"])
            .grant(admin, "settings", Some("general"), &["edit_institute_info", "change_logo", "enable_payment_gateways"])
            .grant(admin, "settings", Some("security"), &["manage_roles", "view_activity_logs"])
            .grant(admin, "settings", Some("integrations"), &["configure_smtp", "configure_sms", "configure_payment_gateways"])
            .grant(admin, "settings", Some("audit"), &["view", "download"]);

        table
            .grant(accountant, "dashboard", None, &["view_stats", "view_notifications"])
            .grant(accountant, "fee_management", Some("fee_structures"), &["view"])
            .grant(accountant, "fee_management", Some("fee_collections"), &["view", "generate_invoice", "mark_paid", "mark_unpaid", "refund", "partial_payment"])
            .grant(accountant, "fee_management", Some("discounts"), &["assign"])
            .grant(accountant, "fee_management", Some("fine_management"), &["add", "edit", "remove"])
            .grant(accountant, "fee_management", Some("payment_modes"), &["view"])
            .grant(accountant, "transactions", None, &["view_own", "download_own_reports", "view_receipt"])
            .grant(accountant, "students", None, &["view_basic_info", "view_fee_info"])
            .grant(accountant, "announcements", None, &["view"])
            .grant(accountant, "notifications", None, &["send_sms", "send_email", "send_inapp"])
            .grant(accountant, "settings", Some("payment"), &["view_gateway_status"])
            .grant(accountant, "profile", None, &["view", "edit"]);

        table
            .grant(student, "dashboard", None, &["view_stats", "view_announcements"])
            .grant(student, "profile", None, &["view", "edit_contact_info"])
            .grant(student, "fee", None, &["view_fee_structure", "view_due_fees", "pay_online", "view_payment_history", "download_receipts"])
            .grant(student, "notifications", None, &["receive_sms", "receive_email", "receive_inapp"])
            .grant(student, "announcements", None, &["view"])
            .grant(student, "support", None, &["create_ticket", "view_ticket_status"]);

        table
    }
}
