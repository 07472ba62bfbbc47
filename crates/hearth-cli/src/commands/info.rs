//! Info command - show the effective configuration.

pub(crate) fn run() -> miette::Result<()> {
    let config = super::load_config()?;

    println!("Hearth");
    println!("======");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Chat (Ollama):");
    println!("  URL:            {}", config.ollama_url);
    println!("  Model:          {}", config.model);
    println!("  Command:        {}", config.ollama_command);
    if let Some(stop) = &config.ollama_stop_command {
        println!("  Stop command:   {}", stop);
    }
    println!("  Context window: {} turns", config.context_window);
    println!("  Temperature:    {}", config.temperature);
    println!("  Max tokens:     {}", config.num_predict);
    println!();

    println!("Images (ComfyUI):");
    println!("  URL:            {}", config.comfy_url());
    println!("  Directory:      {}", config.comfy_dir.display());
    println!("  Command:        {}", config.comfy_command);
    println!("  Template:       {}", config.comfy_template.display());
    println!("  Prompt field:   {}", config.comfy_prompt_pointer);
    println!("  Output:         {}", config.output_dir().display());
    println!("  Wait for image: {:?}", config.artifact_timeout);

    Ok(())
}
