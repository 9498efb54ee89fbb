//! Minimal web-app project skeleton.
//!
//! Scaffolding is skipped when the workspace already has a `package.json`;
//! otherwise a complete Vite + React project is written and dependencies are
//! installed before returning, so the workspace is immediately runnable.

use crate::command::CommandRunner;
use crate::error::{Error, Result};
use crate::workspace::ScopedWorkspace;

/// File whose presence marks a workspace as already scaffolded.
pub const MANIFEST_FILE: &str = "package.json";

/// Directory whose presence means dependencies are installed.
pub const INSTALL_MARKER_DIR: &str = "node_modules";

/// Whether a scaffold call wrote a project or found one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaffoldOutcome {
    Created,
    AlreadyInitialized,
}

/// Writes the project skeleton and installs its dependencies.
#[derive(Debug, Clone)]
pub struct Scaffolder {
    install_command: String,
    runner: CommandRunner,
}

impl Scaffolder {
    pub fn new(install_command: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            install_command: install_command.into(),
            runner,
        }
    }

    /// Scaffolds `workspace` for a dev server bound to `port`.
    pub async fn scaffold(
        &self,
        workspace: &ScopedWorkspace,
        port: u16,
    ) -> Result<ScaffoldOutcome> {
        if workspace.exists(MANIFEST_FILE).await? {
            tracing::info!(root = ?workspace.root(), "workspace already initialized, skipping");
            return Ok(ScaffoldOutcome::AlreadyInitialized);
        }

        for (path, content) in project_files(port) {
            workspace.write_file(path, &content).await?;
        }
        tracing::info!(root = ?workspace.root(), port, "scaffolded project");

        if !workspace.exists(INSTALL_MARKER_DIR).await? {
            tracing::info!(command = %self.install_command, "installing dependencies");
            let result = self
                .runner
                .run(&self.install_command, workspace.root())
                .await;
            if !result.success {
                return Err(Error::Scaffold(format!(
                    "dependency install exited with {}: {}",
                    result.exit_code,
                    result.stderr.trim()
                )));
            }
        }

        Ok(ScaffoldOutcome::Created)
    }
}

/// Returns every file of the skeleton as `(relative path, content)`.
fn project_files(port: u16) -> Vec<(&'static str, String)> {
    vec![
        (MANIFEST_FILE, PACKAGE_JSON.to_string()),
        ("vite.config.js", vite_config(port)),
        ("index.html", INDEX_HTML.to_string()),
        ("src/main.jsx", MAIN_JSX.to_string()),
        ("src/App.jsx", APP_JSX.to_string()),
        ("src/index.css", INDEX_CSS.to_string()),
    ]
}

const PACKAGE_JSON: &str = r#"{
  "name": "sandbox-app",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview"
  },
  "dependencies": {
    "react": "^18.3.1",
    "react-dom": "^18.3.1"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.3.1",
    "vite": "^5.4.0"
  }
}
"#;

fn vite_config(port: u16) -> String {
    format!(
        r#"import {{ defineConfig }} from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({{
  plugins: [react()],
  server: {{
    host: '127.0.0.1',
    port: {port},
    strictPort: true,
  }},
}})
"#
    )
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Sandbox App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const APP_JSX: &str = r#"export default function App() {
  return (
    <main className="app">
      <h1>Your app is ready</h1>
      <p>Edit src/App.jsx to get started.</p>
    </main>
  )
}
"#;

const INDEX_CSS: &str = r#":root {
  font-family: system-ui, -apple-system, sans-serif;
  color: #213547;
  background-color: #ffffff;
}

body {
  margin: 0;
  min-height: 100vh;
}

.app {
  max-width: 960px;
  margin: 0 auto;
  padding: 2rem;
}
"#;
