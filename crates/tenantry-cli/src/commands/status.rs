//! Status command implementation

use anyhow::{Context, Result};
use tenantry::prelude::*;
use tenantry::queries;

pub fn execute(config: &PlatformConfig, organization_id: Uuid) -> Result<()> {
    let store = super::open_store(config)?;

    let org = store
        .read(|conn| queries::get_organization(conn, organization_id))
        .context("Failed to read organization")?;
    let bootstrap = store
        .read(|conn| queries::bootstrap_status(conn, organization_id))
        .context("Failed to read bootstrap status")?;

    println!("\nOrganization {}", organization_id);
    println!("{}", "=".repeat(60));

    match org {
        Some(org) => {
            println!("Name: {}", org.display_name.as_deref().unwrap_or(&org.name));
            match &org.partner_type {
                Some(partner) => println!("Type: {} ({})", org.org_type, partner),
                None => println!("Type: {}", org.org_type),
            }
            if let Some(subdomain) = &org.subdomain {
                println!("Subdomain: {} [{}]", subdomain, org.subdomain_status);
            }
            println!("Active: {}", org.is_active);
            if let Some(deleted_at) = &org.deleted_at {
                println!("Deleted: {}", deleted_at);
            }

            let contacts = store.read(|conn| queries::list_contacts(conn, organization_id))?;
            let addresses = store.read(|conn| queries::list_addresses(conn, organization_id))?;
            let phones = store.read(|conn| queries::list_phones(conn, organization_id))?;
            let invitations = store.read(|conn| queries::list_invitations(conn, organization_id))?;
            println!("\nChildren:");
            println!("  Contacts: {}", contacts.len());
            println!("  Addresses: {}", addresses.len());
            println!("  Phones: {}", phones.len());
            println!("  Invitations: {}", invitations.len());
            for invitation in invitations {
                println!("    {} [{}]", invitation.email, invitation.status);
            }
        }
        None => println!("No organization projection"),
    }

    println!("\nBootstrap:");
    match bootstrap {
        Some(status) => {
            println!("  Status: {}", status.status);
            println!("  Correlation: {}", status.correlation_id);
            if let Some(stage) = status.failure_stage {
                println!("  Failed at: {}", stage);
            }
            if let Some(error) = status.error {
                println!("  Error: {}", error);
            }
        }
        None => println!("  No bootstrap recorded"),
    }

    Ok(())
}
