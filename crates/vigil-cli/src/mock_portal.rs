//! Scripted stand-in for the portal, used by `vigil run --mock`.
//!
//! Pages load instantly but navigation after a click, delayed sections and
//! the login error banner take a few hundred milliseconds, so every wait in
//! the scenario pack is exercised.

use crate::scenarios::{paths, DEMO_EMAIL, DEMO_PASSWORD};
use std::time::Duration;
use vigil::mock::{ClickEffect, FormState, MockElement, MockPage, MockSite};
use vigil::DEFAULT_BASE_URL;

const NAV_DELAY: Duration = Duration::from_millis(150);
const LOGIN_DELAY: Duration = Duration::from_millis(450);
const SECTION_DELAY: Duration = Duration::from_millis(300);
const BANNER_DELAY: Duration = Duration::from_millis(250);

/// Mock portal served at the default base URL
#[must_use]
pub fn demo_site() -> MockSite {
    demo_site_at(DEFAULT_BASE_URL)
}

/// Mock portal served at `origin`
#[must_use]
pub fn demo_site_at(origin: &str) -> MockSite {
    MockSite::new(origin)
        .with_page(paths::HOME, home_page())
        .with_page(paths::LOGIN, login_page())
        .with_page(paths::REGISTER, register_page())
        .with_page(paths::DASHBOARD, dashboard_page())
        .with_page(paths::ADMIN_DASHBOARD, admin_dashboard_page())
        .with_page(paths::SERVICES, simple_page("Services", "Our Services"))
        .with_page(paths::PROFILE, simple_page("Profile", "Edit Profile"))
        .with_page(paths::APPOINTMENTS, simple_page("Appointments", "My Appointments"))
        .with_page(paths::ADMIN_USERS, simple_page("Users", "User Management"))
}

fn link(key: &str, text: &str, path: &str) -> MockElement {
    MockElement::new(key, "a")
        .with_text(text)
        .with_attribute("href", path)
        .navigates_to(path, NAV_DELAY)
}

/// Brand and section links; signed-in visitors also get their dashboard
fn with_navbar(page: MockPage, signed_in: bool) -> MockPage {
    let page = page
        .with_element(MockElement::new("navbar", "nav"))
        .with_element(
            MockElement::new("brand", "span")
                .with_text("Akshaya Services")
                .inside("navbar"),
        )
        .with_element(link("nav-services", "Services", paths::SERVICES).inside("navbar"));
    if !signed_in {
        return page;
    }
    page.with_element(
        link("nav-appointments", "Appointments", paths::APPOINTMENTS).inside("navbar"),
    )
    .with_element(link("nav-dashboard", "Dashboard", paths::DASHBOARD).inside("navbar"))
}

fn home_page() -> MockPage {
    with_navbar(MockPage::new("Akshaya Services - Home"), false)
        .with_element(MockElement::new("hero", "h1").with_text("Welcome to Akshaya Services"))
        .with_element(link("get-started", "Get Started", paths::REGISTER))
        .with_element(link("login-link", "Login", paths::LOGIN))
        .with_element(
            MockElement::new("features", "h2")
                .with_text("Why Choose Akshaya Services")
                .appears_after(SECTION_DELAY),
        )
        .with_element(
            MockElement::new("feature-appointments", "h3")
                .with_text("Easy Appointments")
                .appears_after(SECTION_DELAY),
        )
        .with_element(
            MockElement::new("feature-documents", "h3")
                .with_text("Document Services")
                .appears_after(SECTION_DELAY),
        )
        .with_element(
            MockElement::new("news", "h2")
                .with_text("Latest Government News")
                .appears_after(SECTION_DELAY),
        )
}

fn submit_login(form: &FormState) -> ClickEffect {
    let filled = |key: &str| form.value(key).is_some_and(|v| !v.is_empty());
    if !filled("email") || !filled("password") {
        return ClickEffect::Nothing;
    }
    let accepted =
        form.value("email") == Some(DEMO_EMAIL) && form.value("password") == Some(DEMO_PASSWORD);
    if !accepted {
        return ClickEffect::Reveal {
            key: "login-error".into(),
            after: BANNER_DELAY,
        };
    }
    let path = if form.was_clicked("role-admin") {
        paths::ADMIN_DASHBOARD
    } else {
        paths::DASHBOARD
    };
    ClickEffect::Navigate {
        path: path.into(),
        after: LOGIN_DELAY,
    }
}

/// Each click on the eye flips the password field between masked and plain
fn toggle_password(form: &FormState) -> ClickEffect {
    let kind = if form.click_count("eye") % 2 == 1 {
        "text"
    } else {
        "password"
    };
    ClickEffect::SetAttribute {
        key: "password".into(),
        name: "type".into(),
        value: kind.into(),
    }
}

fn role_radio(role: &str) -> MockElement {
    MockElement::new(format!("role-{role}"), "input")
        .with_attribute("type", "radio")
        .with_attribute("name", "role")
        .with_attribute("value", role)
}

fn login_page() -> MockPage {
    MockPage::new("Login - Akshaya Services")
        .with_element(
            MockElement::new("illustration", "div")
                .with_class("hidden md:flex w-1/2")
                .with_text("Akshaya e-Services")
                .visible_from_width(768),
        )
        .with_element(MockElement::new("logo", "span").with_text("Sahayak AI"))
        .with_element(MockElement::new("welcome", "h2").with_text("Welcome Back"))
        .with_element(
            MockElement::new("email", "input")
                .with_id("email")
                .with_attribute("type", "email")
                .with_attribute("required", ""),
        )
        .with_element(
            MockElement::new("password", "input")
                .with_id("password")
                .with_attribute("type", "password")
                .with_attribute("required", ""),
        )
        .with_element(
            MockElement::new("eye", "button")
                .with_attribute("type", "button")
                .with_attribute("aria-label", "Show password")
                .on_click(toggle_password),
        )
        .with_element(role_radio("user").checked())
        .with_element(role_radio("admin"))
        .with_element(
            MockElement::new("login-error", "div")
                .with_class("bg-red-100")
                .with_text("Invalid email or password")
                .revealed_by_click(),
        )
        .with_element(
            MockElement::new("submit", "button")
                .with_attribute("type", "submit")
                .with_text("Sign In")
                .on_click(submit_login),
        )
        .with_element(
            MockElement::new("google", "button")
                .with_attribute("type", "button")
                .with_text("Sign in with Google"),
        )
        .with_element(link("signup-link", "Sign Up", paths::REGISTER))
        .with_element(link("home-link", "Back to Home", paths::HOME))
}

fn looks_like_email(value: &str) -> bool {
    value
        .split_once('@')
        .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
}

/// Leaving a field validates the email typed so far
fn validate_email(form: &FormState) -> ClickEffect {
    match form.value("email") {
        Some(email) if !looks_like_email(email) => ClickEffect::Reveal {
            key: "email-error".into(),
            after: Duration::ZERO,
        },
        _ => ClickEffect::Nothing,
    }
}

fn register_input(name: &str, kind: &str) -> MockElement {
    MockElement::new(name, "input")
        .with_attribute("name", name)
        .with_attribute("type", kind)
        .on_click(validate_email)
}

fn register_page() -> MockPage {
    MockPage::new("Register - Akshaya Services")
        .with_element(MockElement::new("heading", "h2").with_text("Create Account"))
        .with_element(register_input("firstName", "text"))
        .with_element(register_input("lastName", "text"))
        .with_element(register_input("email", "email"))
        .with_element(register_input("phone", "tel"))
        .with_element(register_input("password", "password"))
        .with_element(register_input("confirmPassword", "password"))
        .with_element(
            MockElement::new("email-error", "p")
                .with_text("Please enter a valid email address")
                .revealed_by_click(),
        )
        .with_element(
            MockElement::new("submit", "button")
                .with_attribute("type", "submit")
                .with_text("Sign Up"),
        )
}

fn dashboard_page() -> MockPage {
    with_navbar(MockPage::new("Dashboard - Akshaya Services"), true)
        .with_element(MockElement::new("greeting", "h1").with_text("Welcome back, Nobin"))
        .with_element(MockElement::new("completed", "div").with_text("Completed Applications"))
        .with_element(
            MockElement::new("upcoming", "div")
                .with_text("Upcoming Appointments")
                .appears_after(SECTION_DELAY),
        )
        .with_element(MockElement::new("quick-actions", "h2").with_text("Quick Actions"))
        .with_element(link("apply", "Apply for Service", paths::SERVICES))
        .with_element(link("edit-profile", "Edit Profile", paths::PROFILE))
}

fn stat_card(key: &str, label: &str) -> MockElement {
    MockElement::new(key, "p")
        .with_text(label)
        .appears_after(SECTION_DELAY)
}

fn admin_dashboard_page() -> MockPage {
    with_navbar(MockPage::new("Admin Dashboard - Akshaya Services"), true)
        .with_element(MockElement::new("sidebar", "aside"))
        .with_element(
            MockElement::new("panel-title", "h2")
                .with_text("Admin Panel")
                .inside("sidebar"),
        )
        .with_element(
            link("side-dashboard", "Dashboard", paths::ADMIN_DASHBOARD).inside("sidebar"),
        )
        .with_element(link("side-users", "Users", paths::ADMIN_USERS).inside("sidebar"))
        .with_element(link("side-services", "Services", "/admin/services").inside("sidebar"))
        .with_element(
            link("side-appointments", "Appointments", "/admin/appointments").inside("sidebar"),
        )
        .with_element(MockElement::new("greeting", "h1").with_text("Admin Dashboard"))
        .with_element(stat_card("total-users", "Total Users"))
        .with_element(stat_card("total-services", "Total Services"))
        .with_element(stat_card("total-appointments", "Total Appointments"))
        .with_element(stat_card("pending-appointments", "Pending Appointments"))
        .with_element(link("manage-users", "Manage Users", paths::ADMIN_USERS))
}

fn simple_page(title: &str, heading: &str) -> MockPage {
    with_navbar(MockPage::new(format!("{title} - Akshaya Services")), true)
        .with_element(MockElement::new("heading", "h1").with_text(heading))
}
