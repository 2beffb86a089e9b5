//! Example: Login Flow with Page Objects
//!
//! Demonstrates: registering pages, typing into a form, and following the
//! navigation a click produces. Runs against the in-memory mock driver, so
//! no browser is needed.
//!
//! Run with: `cargo run --example login_flow`

use pageflow::prelude::*;

#[derive(Page)]
#[page(url = "https://site.test/login")]
struct LoginPage(Page);

#[derive(Page)]
#[page(url = "https://site.test/dashboard")]
struct DashboardPage(Page);

#[derive(Component)]
#[component(selector = "#welcome")]
struct Welcome(Component);

fn fake_site() -> Arc<MockDriver> {
    let driver = Arc::new(MockDriver::at("https://site.test/login"));
    let _ = driver.add(MockElement::new("input").matching("input[name=username]"));
    let _ = driver.add(MockElement::new("input").matching("input[name=password]"));
    let welcome = driver.add(
        MockElement::new("div")
            .matching("#welcome")
            .text("Welcome back, ada")
            .hidden(),
    );
    let _ = driver.add(
        MockElement::new("button")
            .matching("button[type=submit]")
            .text("Sign in")
            .on_click(ClickEffect::Navigate("https://site.test/dashboard".into()))
            .on_click(ClickEffect::Show(welcome)),
    );
    driver
}

#[tokio::main]
async fn main() -> PageflowResult<()> {
    pageflow::logging::init();
    println!("=== Login Flow Example ===\n");

    // 1. Register the pages the test walks through
    let mut registry = Registry::new();
    registry
        .register_page::<LoginPage>()
        .register_page::<DashboardPage>()
        .register_component::<Welcome>();
    println!(
        "1. Registered {} pages and {} component",
        registry.page_count(),
        registry.component_count()
    );

    // 2. Open the login page
    let driver = fake_site();
    let session = Session::new(
        driver.clone(),
        Arc::new(registry),
        Arc::new(PageflowConfig::new().with_element_timeout(1000)),
    );
    let login = session.open::<LoginPage>().await?;
    println!("2. Opened {}", *login);

    // 3. Fill in the form
    login.enter_text("input[name=username]", "ada").await?;
    login.enter_text("input[name=password]", "hunter2").await?;
    println!("3. Typed credentials");

    // 4. Submit and follow the navigation
    let nav = login.click("button[type=submit]").await?;
    println!("4. Click resolved to {}", nav.describe());
    let dashboard: DashboardPage = nav.into_page()?;

    // 5. Use a registered component on the new page
    let welcome = dashboard.component::<Welcome>().await?;
    println!("5. {} says {:?}", *welcome, welcome.text().await?);

    println!("\nDriver calls:");
    for call in driver.history() {
        println!("   {call}");
    }
    Ok(())
}
