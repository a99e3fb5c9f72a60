use serde::Serialize;

use crate::types::Role;

/// Declarative dashboard configuration for one role. The mapping from role
/// to configuration is a single pure function so role behaviour never leaks
/// into scattered conditionals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardConfig {
    pub role: Role,
    pub headline: &'static str,
    pub quick_links: &'static [QuickLink],
    pub shows_application_stats: bool,
    pub shows_posting_stats: bool,
}

/// A primary navigation shortcut on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickLink {
    pub label: &'static str,
    pub href: &'static str,
}

const SEEKER_LINKS: &[QuickLink] = &[
    QuickLink {
        label: "Browse Jobs",
        href: "/jobs",
    },
    QuickLink {
        label: "My Applications",
        href: "/applications",
    },
    QuickLink {
        label: "Messages",
        href: "/messages",
    },
];

const EMPLOYER_LINKS: &[QuickLink] = &[
    QuickLink {
        label: "Post a Job",
        href: "/employer/jobs/new",
    },
    QuickLink {
        label: "Manage Applications",
        href: "/employer/applications",
    },
    QuickLink {
        label: "Messages",
        href: "/messages",
    },
];

const ADMIN_LINKS: &[QuickLink] = &[
    QuickLink {
        label: "All Jobs",
        href: "/jobs",
    },
    QuickLink {
        label: "Users",
        href: "/admin/users",
    },
];

/// Maps a role to its dashboard configuration.
pub fn dashboard_for(role: Role) -> DashboardConfig {
    match role {
        Role::Seeker => DashboardConfig {
            role,
            headline: "Find your next role",
            quick_links: SEEKER_LINKS,
            shows_application_stats: true,
            shows_posting_stats: false,
        },
        Role::Employer => DashboardConfig {
            role,
            headline: "Hire great people",
            quick_links: EMPLOYER_LINKS,
            shows_application_stats: true,
            shows_posting_stats: true,
        },
        Role::Admin => DashboardConfig {
            role,
            headline: "Platform overview",
            quick_links: ADMIN_LINKS,
            shows_application_stats: false,
            shows_posting_stats: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_role_gets_its_own_configuration() {
        let seeker = dashboard_for(Role::Seeker);
        assert!(!seeker.shows_posting_stats);
        assert!(seeker.quick_links.iter().any(|l| l.href == "/jobs"));

        let employer = dashboard_for(Role::Employer);
        assert!(employer.shows_posting_stats);
        assert!(employer
            .quick_links
            .iter()
            .any(|l| l.href == "/employer/applications"));

        let admin = dashboard_for(Role::Admin);
        assert_eq!(admin.role, Role::Admin);
    }

    #[test]
    fn configuration_serializes_for_the_view_layer() {
        let value = serde_json::to_value(dashboard_for(Role::Employer)).unwrap();
        assert_eq!(value["role"].as_str(), Some("employer"));
        assert!(value["quick_links"].as_array().unwrap().len() >= 2);
    }
}
