use jobdesk_core::{
    AuthService, Config, Database, HubHandle, PriorityService, RejectionService, SectionService,
    SystemService, TicketService, WorkflowEngine,
};

/// Shared application state
pub struct AppState {
    config: Config,
    db: Database,
    hub: HubHandle,
    auth: AuthService,
    tickets: TicketService,
    engine: WorkflowEngine,
    priority: PriorityService,
    sections: SectionService,
    system: SystemService,
    rejections: RejectionService,
}

impl AppState {
    pub fn new(config: Config, db: Database, hub: HubHandle) -> Self {
        let auth = AuthService::new(db.clone(), config.auth.clone());
        let tickets = TicketService::new(db.clone(), hub.clone());
        let engine = WorkflowEngine::new(db.clone(), hub.clone());
        let priority = PriorityService::new(db.clone(), hub.clone());
        let sections = SectionService::new(db.clone());
        let system = SystemService::new(db.clone(), hub.clone());
        let rejections = RejectionService::new(db.clone());

        Self {
            config,
            db,
            hub,
            auth,
            tickets,
            engine,
            priority,
            sections,
            system,
            rejections,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn priority(&self) -> &PriorityService {
        &self.priority
    }

    pub fn sections(&self) -> &SectionService {
        &self.sections
    }

    pub fn system(&self) -> &SystemService {
        &self.system
    }

    pub fn rejections(&self) -> &RejectionService {
        &self.rejections
    }
}
