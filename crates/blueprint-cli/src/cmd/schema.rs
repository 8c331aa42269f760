use blueprint_core::manifest::schema::SCHEMA_JSON;

pub fn run() -> anyhow::Result<()> {
    print!("{SCHEMA_JSON}");
    if !SCHEMA_JSON.ends_with('\n') {
        println!();
    }
    Ok(())
}
