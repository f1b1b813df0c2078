//! Acceptance scenarios for the Akshaya Services portal.
//!
//! Each scenario runs in its own browser session. Logged-in scenarios share
//! the [`login_flow`], which fails as soon as the login error banner shows
//! up instead of waiting out the navigation timeout.

use vigil::{
    Condition, Credentials, FailureKind, Flow, FlowParams, FlowResult, HarnessConfig, Locator,
    Scenario, Session, Strategy, Suite, Text, VigilError, VigilResult, Viewport,
};

/// Email of the demo account
pub const DEMO_EMAIL: &str = "nobin@gmail.com";
/// Password of the demo account
pub const DEMO_PASSWORD: &str = "Nobin@7034";

/// Application routes
pub mod paths {
    /// Landing page
    pub const HOME: &str = "/";
    /// Login form
    pub const LOGIN: &str = "/login";
    /// Registration form
    pub const REGISTER: &str = "/register";
    /// User dashboard
    pub const DASHBOARD: &str = "/dashboard";
    /// Admin dashboard
    pub const ADMIN_DASHBOARD: &str = "/admin/dashboard";
    /// Service catalogue
    pub const SERVICES: &str = "/services";
    /// Profile editor
    pub const PROFILE: &str = "/profile";
    /// Booked appointments
    pub const APPOINTMENTS: &str = "/appointments";
    /// Admin user management
    pub const ADMIN_USERS: &str = "/admin/users";
}

/// Selectors shared by the scenarios
pub mod selectors {
    use vigil::Locator;

    /// Email field on the login form
    #[must_use]
    pub fn email_input() -> Locator {
        Locator::css("#email").or(Locator::css("input[type='email']"))
    }

    /// Password field on the login form
    #[must_use]
    pub fn password_input() -> Locator {
        Locator::css("#password").or(Locator::css("input[type='password']"))
    }

    /// Radio button selecting `role`
    #[must_use]
    pub fn role_radio(role: &str) -> Locator {
        Locator::css(format!("input[value='{role}']"))
    }

    /// Form submit button
    #[must_use]
    pub fn submit_button() -> Locator {
        Locator::css("button[type='submit']")
    }

    /// Red banner shown when login is rejected
    #[must_use]
    pub fn error_banner() -> Locator {
        Locator::css(".bg-red-100")
    }

    /// Registration form field by `name`
    #[must_use]
    pub fn field(name: &str) -> Locator {
        Locator::name(name)
    }

    /// Eye button next to the password field
    #[must_use]
    pub fn password_toggle() -> Locator {
        Locator::css("button[type='button']:has(svg)").or(Locator::css("button[type='button']"))
    }

    /// Illustration panel shown from the `md` breakpoint up
    #[must_use]
    pub fn login_illustration() -> Locator {
        Locator::css(r".hidden.md\:flex")
    }

    /// Appointments entry in the navbar
    #[must_use]
    pub fn nav_appointments() -> Locator {
        Locator::css("nav a[href='/appointments']").or(Locator::text("Appointments"))
    }
}

use selectors::{
    email_input, error_banner, field, login_illustration, nav_appointments, password_input,
    password_toggle, role_radio, submit_button,
};

/// Phone-sized viewport for layout checks
pub const MOBILE_VIEWPORT: Viewport = Viewport::new(375, 667);

/// Where a successful login for `role` lands
#[must_use]
pub fn landing_path(role: &str) -> &'static str {
    if role == "admin" {
        paths::ADMIN_DASHBOARD
    } else {
        paths::DASHBOARD
    }
}

/// Log in with the `email` and `password` params, choosing `role`
#[must_use]
pub fn login_flow(role: &str) -> Flow {
    Flow::new(format!("login as {role}"))
        .navigate(paths::LOGIN)
        .then(Condition::element_visible(email_input()))
        .type_text(email_input(), Text::param("email"))
        .type_text(password_input(), Text::param("password"))
        .click(role_radio(role))
        .click(submit_button())
        .then(Condition::url_contains(landing_path(role)).fail_when(error_banner(), "login rejected"))
        .labeled("submit")
}

/// Flow parameters for `credentials`
#[must_use]
pub fn login_params(credentials: &Credentials) -> FlowParams {
    FlowParams::new()
        .with("email", credentials.email.as_str())
        .with("password", credentials.password.as_str())
}

/// Demo accounts: `user`, `admin` and a rejected `invalid` account
#[must_use]
pub fn default_credentials() -> Vec<(&'static str, Credentials)> {
    vec![
        ("user", Credentials::new(DEMO_EMAIL, DEMO_PASSWORD, "user")),
        ("admin", Credentials::new(DEMO_EMAIL, DEMO_PASSWORD, "admin")),
        (
            "invalid",
            Credentials::new("invalid@example.com", "wrongpassword", "user"),
        ),
    ]
}

/// Fill in demo accounts for roles the configuration does not define
#[must_use]
pub fn with_default_credentials(mut config: HarnessConfig) -> HarnessConfig {
    for (role, credentials) in default_credentials() {
        config.credentials.entry(role.to_string()).or_insert(credentials);
    }
    config
}

/// Run the login flow for the configured `role` account
pub fn login(session: &mut Session, config: &HarnessConfig, role: &str) -> VigilResult<FlowResult> {
    let credentials = config.credentials(role)?;
    login_flow(&credentials.role)
        .run(session, &login_params(credentials))?
        .into_result()
}

fn click_when_ready(session: &mut Session, locator: &Locator) -> VigilResult<()> {
    session.wait_for(&Condition::element_clickable(locator.clone()))?;
    session.click(locator)
}

fn expect_all(session: &Session, conditions: Vec<Condition>) -> VigilResult<()> {
    for condition in &conditions {
        session.expect(condition)?;
    }
    Ok(())
}

/// A visible `<a>` whose text contains `text`
fn link_visible(text: &str) -> Condition {
    let text = text.to_string();
    Condition::predicate(format!("link {text:?} visible"), move |state| {
        Ok(state
            .find_elements(&Strategy::TagName("a".to_string()))?
            .iter()
            .any(|link| link.is_visible() && link.text().contains(text.as_str())))
    })
}

fn home_hero(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::HOME)?;
    expect_all(
        session,
        vec![
            Condition::title_contains("Akshaya Services"),
            Condition::element_visible(Locator::tag("h1")),
            Condition::element_clickable(
                Locator::text("Get Started").or(Locator::text("Register")),
            ),
            Condition::element_clickable(Locator::text("Login")),
        ],
    )
}

fn home_to_register(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::HOME)?;
    click_when_ready(
        session,
        &Locator::text("Get Started").or(Locator::text("Register")),
    )?;
    session.wait_for(&Condition::url_contains(paths::REGISTER))?;
    Ok(())
}

fn home_features(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::HOME)?;
    expect_all(
        session,
        vec![
            Condition::any_of(vec![
                Condition::text_present("Why Choose"),
                Condition::text_present("Features"),
            ]),
            Condition::any_of(vec![
                Condition::text_present("Easy Appointments"),
                Condition::text_present("Document"),
            ]),
        ],
    )
}

fn home_latest_news(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::HOME)?;
    session.expect(&Condition::any_of(vec![
        Condition::text_present("Latest News"),
        Condition::text_present("News"),
    ]))?;
    Ok(())
}

fn login_page_elements(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::LOGIN)?;
    expect_all(
        session,
        vec![
            Condition::text_present("Welcome Back"),
            Condition::element_visible(email_input()),
            Condition::element_visible(password_input()),
            Condition::all_of(vec![
                Condition::element_present(role_radio("user")),
                Condition::element_present(role_radio("admin")),
            ]),
            Condition::element_clickable(submit_button()),
            Condition::text_present("Sign in with Google"),
        ],
    )
}

fn login_page_links(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::LOGIN)?;
    click_when_ready(session, &Locator::text("Sign Up"))?;
    session.wait_for(&Condition::url_contains(paths::REGISTER))?;

    session.goto(paths::LOGIN)?;
    click_when_ready(session, &Locator::text("Back to Home"))?;
    let home = config.url(paths::HOME).trim_end_matches('/').to_string();
    session.wait_for(&Condition::predicate("URL is the home page", move |state| {
        Ok(state.current_url()?.trim_end_matches('/') == home)
    }))?;
    Ok(())
}

fn login_password_toggle(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::LOGIN)?;
    session.wait_for(&Condition::attribute_equals(password_input(), "type", "password"))?;
    click_when_ready(session, &password_toggle())?;
    session.expect(&Condition::attribute_equals(password_input(), "type", "text"))?;
    click_when_ready(session, &password_toggle())?;
    session.expect(&Condition::attribute_equals(password_input(), "type", "password"))?;
    Ok(())
}

fn login_role_switch(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::LOGIN)?;
    session.wait_for(&Condition::element_checked(role_radio("user")))?;

    click_when_ready(session, &role_radio("admin"))?;
    expect_all(
        session,
        vec![
            Condition::element_checked(role_radio("admin")),
            Condition::element_unchecked(role_radio("user")),
        ],
    )?;

    click_when_ready(session, &role_radio("user"))?;
    expect_all(
        session,
        vec![
            Condition::element_checked(role_radio("user")),
            Condition::element_unchecked(role_radio("admin")),
        ],
    )
}

fn login_empty_fields(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::LOGIN)?;
    click_when_ready(session, &submit_button())?;
    // the browser blocks submission of required fields
    expect_all(
        session,
        vec![
            Condition::has_attribute(email_input(), "required"),
            Condition::has_attribute(password_input(), "required"),
            Condition::url_contains(paths::LOGIN),
        ],
    )
}

fn login_mobile_layout(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::LOGIN)?;
    session.set_viewport(MOBILE_VIEWPORT)?;
    expect_all(
        session,
        vec![
            Condition::text_present("Sahayak AI"),
            Condition::element_visible(email_input()),
            Condition::element_visible(password_input()),
            Condition::element_visible(submit_button()),
            Condition::element_absent(login_illustration()),
        ],
    )
}

fn dashboard_elements(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "user")?;
    expect_all(
        session,
        vec![
            Condition::element_visible(Locator::tag("h1")),
            Condition::any_of(vec![
                Condition::text_present("Completed"),
                Condition::text_present("Upcoming"),
            ]),
            Condition::text_present("Quick Actions"),
        ],
    )
}

fn dashboard_link(
    session: &mut Session,
    config: &HarnessConfig,
    text: &str,
    path: &str,
) -> VigilResult<()> {
    login(session, config, "user")?;
    click_when_ready(session, &Locator::text(text))?;
    session.wait_for(&Condition::url_contains(path))?;
    Ok(())
}

fn dashboard_nav_appointments(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "user")?;
    click_when_ready(session, &nav_appointments())?;
    session.wait_for(&Condition::url_contains(paths::APPOINTMENTS))?;
    Ok(())
}

fn navbar_items(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "user")?;
    expect_all(
        session,
        vec![
            Condition::element_visible(Locator::tag("nav")),
            Condition::text_present("Akshaya Services"),
            link_visible("Dashboard"),
        ],
    )
}

fn register_fields(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::REGISTER)?;
    let mut conditions: Vec<Condition> = [
        "firstName",
        "lastName",
        "email",
        "phone",
        "password",
        "confirmPassword",
    ]
    .into_iter()
    .map(|name| Condition::element_visible(field(name)))
    .collect();
    conditions.push(Condition::element_clickable(submit_button()));
    expect_all(session, conditions)
}

fn register_email_validation(session: &mut Session, _config: &HarnessConfig) -> VigilResult<()> {
    session.goto(paths::REGISTER)?;
    session.wait_for(&Condition::element_visible(field("email")))?;
    session.type_into(&field("email"), "invalid-email")?;
    // moving focus triggers validation
    session.click(&field("phone"))?;
    session.expect(&Condition::text_present("valid email"))?;
    Ok(())
}

fn user_login(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "user")?;
    expect_all(
        session,
        vec![
            Condition::url_contains(paths::DASHBOARD),
            Condition::element_visible(Locator::tag("nav")),
        ],
    )
}

fn admin_login(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "admin")?;
    session.expect(&Condition::url_contains(paths::ADMIN_DASHBOARD))?;
    Ok(())
}

fn admin_stats_cards(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "admin")?;
    expect_all(
        session,
        [
            "Total Users",
            "Total Services",
            "Total Appointments",
            "Pending Appointments",
        ]
        .into_iter()
        .map(Condition::text_present)
        .collect(),
    )
}

fn admin_sidebar(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "admin")?;
    let mut conditions = vec![Condition::text_present("Admin Panel")];
    conditions.extend(
        ["Dashboard", "Users", "Services", "Appointments"]
            .into_iter()
            .map(link_visible),
    );
    expect_all(session, conditions)
}

fn admin_manage_users(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    login(session, config, "admin")?;
    click_when_ready(session, &Locator::text("Manage Users"))?;
    session.wait_for(&Condition::url_contains(paths::ADMIN_USERS))?;
    Ok(())
}

fn invalid_login(session: &mut Session, config: &HarnessConfig) -> VigilResult<()> {
    let rejected = match login(session, config, "invalid") {
        Err(e) if e.kind() == FailureKind::ConditionFailed => true,
        Err(e) => return Err(e),
        Ok(_) => false,
    };
    if !rejected {
        return Err(VigilError::ConditionFailed {
            condition: "invalid credentials rejected".to_string(),
            reason: "login was accepted".to_string(),
            last_observed: session.current_url()?,
        });
    }
    expect_all(
        session,
        vec![
            Condition::element_visible(error_banner()),
            Condition::url_contains(paths::LOGIN),
        ],
    )
}

/// Every portal scenario, in run order
#[must_use]
pub fn portal_suite() -> Suite {
    Suite::new("portal")
        .with_scenario(Scenario::new("home page hero", home_hero).with_tag("home"))
        .with_scenario(Scenario::new("home get started opens registration", home_to_register).with_tag("home"))
        .with_scenario(Scenario::new("home features section", home_features).with_tag("home"))
        .with_scenario(Scenario::new("home latest news", home_latest_news).with_tag("home"))
        .with_scenario(Scenario::new("login page elements", login_page_elements).with_tag("login"))
        .with_scenario(Scenario::new("login page links", login_page_links).with_tag("login"))
        .with_scenario(
            Scenario::new("login password toggle", login_password_toggle).with_tag("login"),
        )
        .with_scenario(Scenario::new("login role switch", login_role_switch).with_tag("login"))
        .with_scenario(
            Scenario::new("login empty field validation", login_empty_fields).with_tag("login"),
        )
        .with_scenario(
            Scenario::new("login page mobile layout", login_mobile_layout)
                .with_tag("login")
                .with_tag("mobile"),
        )
        .with_scenario(
            Scenario::new("dashboard main elements", dashboard_elements).with_tag("dashboard"),
        )
        .with_scenario(
            Scenario::new("dashboard apply for service", |session: &mut Session, config: &HarnessConfig| {
                dashboard_link(session, config, "Apply for Service", paths::SERVICES)
            })
            .with_tag("dashboard"),
        )
        .with_scenario(
            Scenario::new("dashboard edit profile", |session: &mut Session, config: &HarnessConfig| {
                dashboard_link(session, config, "Edit Profile", paths::PROFILE)
            })
            .with_tag("dashboard"),
        )
        .with_scenario(
            Scenario::new("dashboard navbar appointments", dashboard_nav_appointments)
                .with_tag("dashboard"),
        )
        .with_scenario(
            Scenario::new("navbar items when logged in", navbar_items).with_tag("dashboard"),
        )
        .with_scenario(Scenario::new("register form fields", register_fields).with_tag("register"))
        .with_scenario(
            Scenario::new("register email validation", register_email_validation)
                .with_tag("register"),
        )
        .with_scenario(
            Scenario::new("user login reaches dashboard", user_login)
                .with_tag("login")
                .with_tag("dashboard"),
        )
        .with_scenario(
            Scenario::new("admin login reaches admin dashboard", admin_login)
                .with_tag("login")
                .with_tag("admin"),
        )
        .with_scenario(Scenario::new("admin stats cards", admin_stats_cards).with_tag("admin"))
        .with_scenario(
            Scenario::new("admin sidebar navigation", admin_sidebar).with_tag("admin"),
        )
        .with_scenario(Scenario::new("admin manage users", admin_manage_users).with_tag("admin"))
        .with_scenario(
            Scenario::new("invalid credentials rejected", invalid_login).with_tag("login"),
        )
}
