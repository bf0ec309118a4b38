//! `persona knowledge`: inspect the knowledge corpus.

use crate::runtime::Runtime;

pub async fn search(query: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load().await?;

    println!("🔍 Searching knowledge for: \"{query}\"");
    println!();

    let hits = runtime.assistant.knowledge().search(query, limit).await?;
    if hits.is_empty() {
        println!("   No documents found. Add some under [[knowledge.documents]] in config.toml.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let preview: String = hit.content.chars().take(80).collect();
        println!("  {:>2}. [{:.1}%] {} ({})", i + 1, hit.similarity * 100.0, hit.title, hit.id);
        println!("      {preview}");
        if !hit.tags.is_empty() {
            println!("      tags: {}", hit.tags.join(", "));
        }
    }

    Ok(())
}

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load().await?;
    let stats = runtime.assistant.knowledge().stats().await;

    println!("🧠 Knowledge Statistics");
    println!("=======================");
    println!("  Documents:     {}", stats.total_documents);
    println!("  Search limit:  {}", runtime.config.knowledge.search_limit);
    println!("  Embeddings:    {}", runtime.config.provider.embedding_model);
    for summary in &stats.document_summaries {
        println!(
            "  - {} \"{}\" ({} chars){}",
            summary.id,
            summary.title,
            summary.content_length,
            if summary.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", summary.tags.join(", "))
            }
        );
    }

    Ok(())
}
