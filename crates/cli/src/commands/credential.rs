//! `persona credential`: manage an owner's stored API key.

use crate::runtime::Runtime;
use persona_agent::{CredentialAction, CredentialActionResult};

async fn apply(owner: &str, action: CredentialAction) -> Result<CredentialActionResult, Box<dyn std::error::Error>> {
    let runtime = Runtime::load_without_knowledge()?;
    Ok(runtime.assistant.manage_credential(owner, action).await?)
}

pub async fn set(owner: &str, key: String) -> Result<(), Box<dyn std::error::Error>> {
    if let CredentialActionResult::Stored(outcome) =
        apply(owner, CredentialAction::Store { api_key: key }).await?
    {
        if outcome.valid {
            println!(
                "✅ Credential stored for '{owner}' ({} models available)",
                outcome.models_available.unwrap_or_default()
            );
        } else {
            println!("⚠️  Credential stored for '{owner}' but the provider rejected it.");
            println!("   It will not be used until `persona credential revalidate` succeeds.");
        }
    }
    Ok(())
}

pub async fn status(owner: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let CredentialActionResult::Status(status) = apply(owner, CredentialAction::Status).await? {
        println!("🔑 Credential status for '{owner}'");
        println!("  Stored:          {}", if status.has_credential { "yes" } else { "no" });
        println!("  Valid:           {}", if status.is_valid { "yes" } else { "no" });
        match status.last_validated_at {
            Some(at) => println!("  Last validated:  {}", at.to_rfc3339()),
            None => println!("  Last validated:  never"),
        }
    }
    Ok(())
}

pub async fn revalidate(owner: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let CredentialActionResult::Revalidated(validation) =
        apply(owner, CredentialAction::Revalidate).await?
    {
        if validation.valid {
            println!("✅ Credential for '{owner}' is valid");
        } else {
            println!(
                "❌ Credential for '{owner}' was rejected: {}",
                validation.error.unwrap_or_default()
            );
        }
    }
    Ok(())
}

pub async fn remove(owner: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let CredentialActionResult::Removed(outcome) = apply(owner, CredentialAction::Remove).await? {
        if outcome.success {
            println!("🗑️  Credential removed for '{owner}'");
        } else {
            println!("   No credential on file for '{owner}'");
        }
    }
    Ok(())
}
