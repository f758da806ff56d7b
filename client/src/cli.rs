use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{
    split_location_input, ApiKeyRequest, ApiKeyResponse, BulkDuplicationRequest, BulkOutcome,
    ClearCompletedResponse, DeletedResponse, DuplicationRequest, ErrorBody, LocationList,
    LocationListRequest, NewRecord, ProcessResponse, QueueStatus, Record, RecordStatus,
    StepOutcome, SubmitOutcome, Task,
};
use common::record::JOB_LISTING_KIND;
use reqwest::{Client, Response};
use std::env;

/// - En Docker: SERVER_URL=http://server:8080
/// - Local: default http://localhost:8080
fn server_base_url() -> String {
    env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI del operador para el server de duplicación de job listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Duplica un job listing en varias ubicaciones
    Submit {
        #[arg(value_name = "JOB_ID")]
        job_id: i64,

        #[arg(long)]
        company: i64,

        /// Ubicaciones separadas por coma, ej: "Lima, Quito"
        #[arg(long, conflicts_with = "list")]
        locations: Option<String>,

        /// Id de una lista de ubicaciones guardada
        #[arg(long)]
        list: Option<String>,

        /// Fecha de publicación, ej: "2030-01-31 09:00:00"
        #[arg(long)]
        schedule: Option<String>,
    },
    /// Mismas ubicaciones para varios job listings
    Bulk {
        #[arg(value_name = "JOB_IDS", required = true, num_args = 1..)]
        job_ids: Vec<i64>,

        #[arg(long)]
        company: i64,

        #[arg(long, conflicts_with = "list")]
        locations: Option<String>,

        #[arg(long)]
        list: Option<String>,

        #[arg(long)]
        schedule: Option<String>,
    },
    /// Estado de la cola
    Status,
    /// Dispara un lote a mano
    Process,
    /// Borra las tareas completadas
    Clear,
    /// Detalle de una tarea de la cola
    Task {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Lista las listas de ubicaciones guardadas
    Lists,
    /// Crea o actualiza (con --id) una lista de ubicaciones
    ListSave {
        #[arg(value_name = "NOMBRE")]
        name: String,

        #[arg(value_name = "UBICACIONES")]
        locations: String,

        #[arg(long)]
        id: Option<String>,
    },
    ListShow {
        #[arg(value_name = "LIST_ID")]
        id: String,
    },
    ListDelete {
        #[arg(value_name = "LIST_ID")]
        id: String,
    },
    /// Todas las ubicaciones guardadas, sin repetir
    Locations,
    /// Guarda la API key (vacía = borrarla)
    ApiKey {
        #[arg(value_name = "KEY", default_value = "")]
        key: String,
    },
    ValidateKey {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Crea un job listing origen
    RecordCreate {
        #[arg(value_name = "TITULO")]
        title: String,

        #[arg(long, default_value = "")]
        content: String,

        /// Atributos extra, ej: --attr salary=1000
        #[arg(long = "attr", value_name = "CLAVE=VALOR")]
        attrs: Vec<String>,
    },
    RecordShow {
        #[arg(value_name = "RECORD_ID")]
        id: u64,
    },
}

/// Imprime el error del server (o sólo el status si el cuerpo no es JSON).
async fn print_error(resp: Response) -> Result<()> {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => println!("Error ({}): {:?} - {}", status, body.error, body.message),
        Err(_) => println!("Error: status {}", status),
    }
    Ok(())
}

fn print_outcome(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Immediate {
            total,
            duplicated,
            failed,
            jobs,
            errors,
        } => {
            println!("Duplicación inmediata:");
            println!("  total={}, duplicados={}, fallidos={}", total, duplicated, failed);
            for j in jobs {
                println!("    - {} -> job {}", j.location, j.job_id);
            }
            for e in errors {
                println!("    ! {}: {:?} ({})", e.location, e.error_kind, e.message);
            }
        }
        SubmitOutcome::Background {
            task_id,
            total,
            message,
        } => {
            println!("Encolado en segundo plano:");
            println!("  tarea: {}", task_id);
            println!("  ubicaciones: {}", total);
            println!("  {}", message);
        }
    }
}

fn print_task(task: &Task) {
    println!("Tarea {}", task.id);
    println!("  job: {}  company: {}", task.job_id, task.company_id);
    println!("  estado: {:?}", task.status);
    println!(
        "  progreso: {}/{} (ok={}, fallidos={})",
        task.processed, task.total, task.success, task.failed
    );
    if let Some(date) = task.schedule_date {
        println!("  programado para: {}", date);
    }
    println!("  creada: {}", task.created);
    if let Some(done) = task.completed {
        println!("  completada: {}", done);
    }
    for e in &task.errors {
        println!("    ! {}: {:?} ({})", e.location, e.error_kind, e.message);
    }
}

fn print_list(list: &LocationList) {
    println!("Lista {} ({})", list.name, list.id);
    println!("  ubicaciones ({}): {}", list.count, list.locations.join(", "));
    println!("  actualizada: {}", list.updated);
}

fn print_record(rec: &Record) {
    println!("Registro {}", rec.id);
    println!("  titulo: {}", rec.title);
    println!("  estado: {:?}", rec.status);
    if let Some(date) = rec.date {
        println!("  fecha: {}", date);
    }
    for (k, v) in &rec.attributes {
        println!("  {} = {}", k, v);
    }
}

fn parse_attrs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
            _ => anyhow::bail!("atributo inválido {kv:?}, se espera CLAVE=VALOR"),
        })
        .collect()
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = server_base_url();

    match cli.command {
        Commands::Submit {
            job_id,
            company,
            locations,
            list,
            schedule,
        } => {
            let url = format!("{}/api/v1/duplications", base_url);
            let req = DuplicationRequest {
                job_id,
                company_id: company,
                locations: locations.as_deref().map(split_location_input),
                list_id: list,
                schedule_date: schedule,
            };

            let resp = client.post(&url).json(&req).send().await?;
            if resp.status().is_success() {
                let outcome: SubmitOutcome = resp.json().await?;
                print_outcome(&outcome);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::Bulk {
            job_ids,
            company,
            locations,
            list,
            schedule,
        } => {
            let url = format!("{}/api/v1/duplications/bulk", base_url);
            let req = BulkDuplicationRequest {
                job_ids,
                company_id: company,
                locations: locations.as_deref().map(split_location_input),
                list_id: list,
                schedule_date: schedule,
            };

            let resp = client.post(&url).json(&req).send().await?;
            if resp.status().is_success() {
                let out: BulkOutcome = resp.json().await?;
                println!("Duplicación masiva:");
                println!(
                    "  jobs={}, procesados={}, fallidos={}, encolados={}",
                    out.total, out.processed, out.failed, out.added_to_queue
                );
                for d in out.details {
                    match (d.outcome, d.error) {
                        (Some(SubmitOutcome::Immediate { duplicated, failed, .. }), _) => {
                            println!("  job {}: inmediato, {} ok, {} fallidos", d.job_id, duplicated, failed)
                        }
                        (Some(SubmitOutcome::Background { task_id, .. }), _) => {
                            println!("  job {}: encolado en {}", d.job_id, task_id)
                        }
                        (None, Some(err)) => {
                            println!("  job {}: error {:?} ({})", d.job_id, err.error, err.message)
                        }
                        (None, None) => println!("  job {}: sin resultado", d.job_id),
                    }
                }
            } else {
                print_error(resp).await?;
            }
        }

        Commands::Status => {
            let url = format!("{}/api/v1/queue", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let st: QueueStatus = resp.json().await?;
                println!("Cola:");
                println!("  procesando: {}", st.is_processing);
                println!(
                    "  tareas: total={}, pendientes={}, en curso={}, completadas={}",
                    st.total_tasks, st.pending_tasks, st.processing_tasks, st.completed_tasks
                );

                if st.total_jobs > 0 {
                    let pct = (st.processed_jobs as f64 / st.total_jobs as f64) * 100.0;
                    println!(
                        "  ubicaciones: {}/{} ({:.1}%)",
                        st.processed_jobs, st.total_jobs, pct
                    );
                } else {
                    println!("  ubicaciones: (cola vacía)");
                }

                if let Some(task) = st.current_task {
                    println!("  tarea actual: {} ({}/{})", task.id, task.processed, task.total);
                }
                for task in st.queue {
                    println!("    - {} {:?} {}/{}", task.id, task.status, task.processed, task.total);
                }
            } else {
                print_error(resp).await?;
            }
        }

        Commands::Process => {
            let url = format!("{}/api/v1/queue/process", base_url);
            let resp = client.post(&url).send().await?;
            let status = resp.status();
            match resp.json::<ProcessResponse>().await {
                Ok(body) => {
                    println!("{}", body.message);
                    if let Some(StepOutcome::Advanced {
                        task_id,
                        processed,
                        total,
                        status,
                        ..
                    }) = body.outcome
                    {
                        println!("  tarea {}: {}/{} ({:?})", task_id, processed, total, status);
                    } else if let Some(other) = body.outcome {
                        println!("  resultado: {:?}", other);
                    }
                }
                Err(_) => println!("Error disparando el procesamiento (status {})", status),
            }
        }

        Commands::Clear => {
            let url = format!("{}/api/v1/queue/clear-completed", base_url);
            let resp = client.post(&url).send().await?;
            if resp.status().is_success() {
                let body: ClearCompletedResponse = resp.json().await?;
                println!("Tareas completadas borradas: {}", body.cleared);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::Task { id } => {
            let url = format!("{}/api/v1/queue/tasks/{id}", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let task: Task = resp.json().await?;
                print_task(&task);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::Lists => {
            let url = format!("{}/api/v1/location-lists", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let lists: Vec<LocationList> = resp.json().await?;
                if lists.is_empty() {
                    println!("No hay listas guardadas.");
                }
                for l in lists {
                    print_list(&l);
                }
            } else {
                print_error(resp).await?;
            }
        }

        Commands::ListSave { name, locations, id } => {
            let req = LocationListRequest {
                name,
                locations: split_location_input(&locations),
            };
            let resp = match id {
                Some(id) => {
                    let url = format!("{}/api/v1/location-lists/{id}", base_url);
                    client.put(&url).json(&req).send().await?
                }
                None => {
                    let url = format!("{}/api/v1/location-lists", base_url);
                    client.post(&url).json(&req).send().await?
                }
            };
            if resp.status().is_success() {
                let list: LocationList = resp.json().await?;
                println!("Lista guardada:");
                print_list(&list);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::ListShow { id } => {
            let url = format!("{}/api/v1/location-lists/{id}", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let list: LocationList = resp.json().await?;
                print_list(&list);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::ListDelete { id } => {
            let url = format!("{}/api/v1/location-lists/{id}", base_url);
            let resp = client.delete(&url).send().await?;
            if resp.status().is_success() {
                let body: DeletedResponse = resp.json().await?;
                println!("{} ({})", body.message, body.id);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::Locations => {
            let url = format!("{}/api/v1/locations", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let all: Vec<String> = resp.json().await?;
                if all.is_empty() {
                    println!("No hay ubicaciones guardadas.");
                }
                for l in all {
                    println!("  - {}", l);
                }
            } else {
                print_error(resp).await?;
            }
        }

        Commands::ApiKey { key } => {
            let url = format!("{}/api/v1/api-key", base_url);
            let resp = client
                .put(&url)
                .json(&ApiKeyRequest { api_key: key })
                .send()
                .await?;
            if resp.status().is_success() {
                let body: ApiKeyResponse = resp.json().await?;
                println!("{}", body.message);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::ValidateKey { key } => {
            let url = format!("{}/api/v1/api-key/validate", base_url);
            let resp = client
                .post(&url)
                .json(&ApiKeyRequest { api_key: key })
                .send()
                .await?;
            if resp.status().is_success() {
                let body: ApiKeyResponse = resp.json().await?;
                println!("{}", body.message);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::RecordCreate {
            title,
            content,
            attrs,
        } => {
            let url = format!("{}/api/v1/records", base_url);
            let req = NewRecord {
                kind: JOB_LISTING_KIND.to_string(),
                title,
                content,
                excerpt: String::new(),
                author: 0,
                status: RecordStatus::Publish,
                date: None,
                menu_order: 0,
                attributes: parse_attrs(&attrs)?.into_iter().collect(),
                classifications: Default::default(),
            };

            let resp = client.post(&url).json(&req).send().await?;
            if resp.status().is_success() {
                let rec: Record = resp.json().await?;
                println!("Registro creado:");
                print_record(&rec);
            } else {
                print_error(resp).await?;
            }
        }

        Commands::RecordShow { id } => {
            let url = format!("{}/api/v1/records/{id}", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let rec: Record = resp.json().await?;
                print_record(&rec);
            } else {
                print_error(resp).await?;
            }
        }
    }

    Ok(())
}
