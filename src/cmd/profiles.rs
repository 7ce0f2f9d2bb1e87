use anyhow::Result;

use repcast::exercise::Phase;
use repcast::Settings;

pub fn cmd_profiles(settings: &Settings) -> Result<()> {
    let catalog = settings.catalog()?;

    for profile in catalog.iter() {
        let phase = match profile.phase {
            Phase::Single => "",
            Phase::TwoPhase => " [two-phase]",
        };
        if profile.description.is_empty() {
            println!("{}{phase}", profile.name);
        } else {
            println!("{:<16} {}{phase}", profile.name, profile.description);
        }
    }

    Ok(())
}
