//! Closed enumerations of the tables the gateway serves.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Clinical and lab-provenance record kinds.
///
/// Every kind is stored with per-field tiers and is subject to redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClinicalKind {
    Patients,
    Enrollments,
    Consents,
    Diagnoses,
    Samples,
    Treatments,
    Outcomes,
    Complications,
    Tumourboards,
    Chemotherapies,
    Radiotherapies,
    Surgeries,
    Immunotherapies,
    Celltransplants,
    Slides,
    Studies,
    Labtests,
    Extractions,
    Sequencing,
    Alignments,
    #[serde(rename = "variantcalling")]
    VariantCalling,
    #[serde(rename = "fusiondetection")]
    FusionDetection,
    #[serde(rename = "expressionanalysis")]
    ExpressionAnalysis,
}

impl ClinicalKind {
    pub const ALL: [ClinicalKind; 23] = [
        Self::Patients,
        Self::Enrollments,
        Self::Consents,
        Self::Diagnoses,
        Self::Samples,
        Self::Treatments,
        Self::Outcomes,
        Self::Complications,
        Self::Tumourboards,
        Self::Chemotherapies,
        Self::Radiotherapies,
        Self::Surgeries,
        Self::Immunotherapies,
        Self::Celltransplants,
        Self::Slides,
        Self::Studies,
        Self::Labtests,
        Self::Extractions,
        Self::Sequencing,
        Self::Alignments,
        Self::VariantCalling,
        Self::FusionDetection,
        Self::ExpressionAnalysis,
    ];

    /// Table name: the response key, the snapshot key and the URL segment.
    pub fn table(self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::Enrollments => "enrollments",
            Self::Consents => "consents",
            Self::Diagnoses => "diagnoses",
            Self::Samples => "samples",
            Self::Treatments => "treatments",
            Self::Outcomes => "outcomes",
            Self::Complications => "complications",
            Self::Tumourboards => "tumourboards",
            Self::Chemotherapies => "chemotherapies",
            Self::Radiotherapies => "radiotherapies",
            Self::Surgeries => "surgeries",
            Self::Immunotherapies => "immunotherapies",
            Self::Celltransplants => "celltransplants",
            Self::Slides => "slides",
            Self::Studies => "studies",
            Self::Labtests => "labtests",
            Self::Extractions => "extractions",
            Self::Sequencing => "sequencing",
            Self::Alignments => "alignments",
            Self::VariantCalling => "variantcalling",
            Self::FusionDetection => "fusiondetection",
            Self::ExpressionAnalysis => "expressionanalysis",
        }
    }

    pub fn from_table(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.table() == name)
    }

    /// Domain fields, in declaration order. Each may carry a tier.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Patients => PATIENT_FIELDS,
            Self::Enrollments => ENROLLMENT_FIELDS,
            Self::Consents => CONSENT_FIELDS,
            Self::Diagnoses => DIAGNOSIS_FIELDS,
            Self::Samples => SAMPLE_FIELDS,
            Self::Treatments => TREATMENT_FIELDS,
            Self::Outcomes => OUTCOME_FIELDS,
            Self::Complications => COMPLICATION_FIELDS,
            Self::Tumourboards => TUMOURBOARD_FIELDS,
            Self::Chemotherapies => CHEMOTHERAPY_FIELDS,
            Self::Radiotherapies => RADIOTHERAPY_FIELDS,
            Self::Surgeries => SURGERY_FIELDS,
            Self::Immunotherapies => IMMUNOTHERAPY_FIELDS,
            Self::Celltransplants => CELLTRANSPLANT_FIELDS,
            Self::Slides => SLIDE_FIELDS,
            Self::Studies => STUDY_FIELDS,
            Self::Labtests => LABTEST_FIELDS,
            Self::Extractions => EXTRACTION_FIELDS,
            Self::Sequencing => SEQUENCING_FIELDS,
            Self::Alignments => ALIGNMENT_FIELDS,
            Self::VariantCalling => VARIANT_CALLING_FIELDS,
            Self::FusionDetection => FUSION_DETECTION_FIELDS,
            Self::ExpressionAnalysis => EXPRESSION_ANALYSIS_FIELDS,
        }
    }

    pub fn has_field(self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Whether records of this kind carry the patient join key.
    ///
    /// Lab-provenance kinds are keyed by sample and cannot take part in
    /// compound queries.
    pub fn joinable(self) -> bool {
        self.has_field(crate::PATIENT_KEY)
    }
}

impl Display for ClinicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Genomic and catalogue kinds. These bypass field redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenomicKind {
    Datasets,
    VariantSets,
    Variants,
    ReadGroupSets,
    FeatureSets,
    Features,
    ReferenceSets,
}

impl GenomicKind {
    pub const ALL: [GenomicKind; 7] = [
        Self::Datasets,
        Self::VariantSets,
        Self::Variants,
        Self::ReadGroupSets,
        Self::FeatureSets,
        Self::Features,
        Self::ReferenceSets,
    ];

    /// URL segment, e.g. `/variantsets/search`.
    pub fn path(self) -> &'static str {
        match self {
            Self::Datasets => "datasets",
            Self::VariantSets => "variantsets",
            Self::Variants => "variants",
            Self::ReadGroupSets => "readgroupsets",
            Self::FeatureSets => "featuresets",
            Self::Features => "features",
            Self::ReferenceSets => "referencesets",
        }
    }

    /// Key under which search responses list their records.
    pub fn table(self) -> &'static str {
        match self {
            Self::Datasets => "datasets",
            Self::VariantSets => "variantSets",
            Self::Variants => "variants",
            Self::ReadGroupSets => "readGroupSets",
            Self::FeatureSets => "featureSets",
            Self::Features => "features",
            Self::ReferenceSets => "referenceSets",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.path() == path)
    }
}

impl Display for GenomicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Tables a compound query may name as a component or as its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultTable {
    Clinical(ClinicalKind),
    Variants,
    VariantsByGene,
}

impl ResultTable {
    /// Resolves a compound-query table name. Only joinable tables resolve.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "variants" => Some(Self::Variants),
            "variantsByGene" => Some(Self::VariantsByGene),
            other => ClinicalKind::from_table(other)
                .filter(|k| k.joinable())
                .map(Self::Clinical),
        }
    }

    /// Name as written in requests.
    pub fn name(self) -> &'static str {
        match self {
            Self::Clinical(kind) => kind.table(),
            Self::Variants => "variants",
            Self::VariantsByGene => "variantsByGene",
        }
    }

    /// Key under which results are returned; gene searches return variants.
    pub fn response_key(self) -> &'static str {
        match self {
            Self::Clinical(kind) => kind.table(),
            Self::Variants | Self::VariantsByGene => "variants",
        }
    }
}

impl Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Field catalogues
// ============================================================================

const PATIENT_FIELDS: &[&str] = &[
    "patientId",
    "otherIds",
    "dateOfBirth",
    "gender",
    "ethnicity",
    "race",
    "provinceOfResidence",
    "dateOfDeath",
    "causeOfDeath",
    "autopsyTissueForResearch",
    "priorMalignancy",
    "dateOfPriorMalignancy",
    "familyHistoryAndRiskFactors",
    "familyHistoryOfPredispositionSyndrome",
    "detailsOfPredispositionSyndrome",
    "geneticCancerSyndrome",
    "otherGeneticConditionOrSignificantComorbidity",
    "occupationalOrEnvironmentalExposure",
];

const ENROLLMENT_FIELDS: &[&str] = &[
    "patientId",
    "enrollmentInstitution",
    "enrollmentApprovalDate",
    "crossEnrollment",
    "otherPersonalizedMedicineStudyName",
    "otherPersonalizedMedicineStudyId",
    "ageAtEnrollment",
    "eligibilityCategory",
    "statusAtEnrollment",
    "primaryOncologistName",
    "primaryOncologistContact",
    "referringPhysicianName",
    "referringPhysicianContact",
    "summaryOfIdRequest",
    "treatingCentreName",
    "treatingCentreProvince",
];

const CONSENT_FIELDS: &[&str] = &[
    "patientId",
    "consentId",
    "consentDate",
    "consentVersion",
    "patientConsentedTo",
    "reasonForRejection",
    "wasAssentObtained",
    "dateOfAssent",
    "assentFormVersion",
    "ifAssentNotObtainedWhyNot",
    "reconsentDate",
    "reconsentVersion",
    "consentingCoordinatorName",
    "previouslyConsented",
    "nameOfOtherBiobank",
    "hasConsentBeenWithdrawn",
    "dateOfConsentWithdrawal",
    "typeOfConsentWithdrawal",
    "reasonForConsentWithdrawal",
    "consentFormComplete",
];

const DIAGNOSIS_FIELDS: &[&str] = &[
    "patientId",
    "diagnosisId",
    "diagnosisDate",
    "ageAtDiagnosis",
    "cancerType",
    "classification",
    "cancerSite",
    "histology",
    "methodOfDefinitiveDiagnosis",
    "sampleType",
    "sampleSite",
    "tumorGrade",
    "gradingSystemUsed",
    "sitesOfMetastases",
    "stagingSystem",
    "versionOrEditionOfTheStagingSystem",
    "specificTumorStageAtDiagnosis",
    "prognosticBiomarkers",
    "biomarkerQuantification",
    "additionalMolecularTesting",
    "additionalTestType",
    "laboratoryName",
    "laboratoryAddress",
    "siteOfMetastases",
    "stagingSystemVersion",
    "specificStage",
    "cancerSpecificBiomarkers",
    "additionalMolecularDiagnosticTestingPerformed",
    "additionalTest",
];

const SAMPLE_FIELDS: &[&str] = &[
    "patientId",
    "sampleId",
    "diagnosisId",
    "localBiobankId",
    "collectionDate",
    "collectionHospital",
    "sampleType",
    "tissueDiseaseState",
    "anatomicSiteTheSampleObtainedFrom",
    "cancerType",
    "cancerSubtype",
    "pathologyReportId",
    "morphologicalCode",
    "topologicalCode",
    "shippingDate",
    "receivedDate",
    "qualityControlPerformed",
    "estimatedTumorContent",
    "quantity",
    "units",
    "associatedBiobank",
    "otherBiobank",
    "sopFollowed",
    "ifNotExplainAnyDeviation",
    "recordingDate",
    "startInterval",
];

const TREATMENT_FIELDS: &[&str] = &[
    "patientId",
    "courseNumber",
    "therapeuticModality",
    "treatmentPlanType",
    "treatmentIntent",
    "startDate",
    "stopDate",
    "reasonForEndingTheTreatment",
    "responseToTreatment",
    "responseCriteriaUsed",
    "dateOfRecurrenceOrProgressionAfterThisTreatment",
    "diagnosisId",
    "treatmentPlanId",
];

const OUTCOME_FIELDS: &[&str] = &[
    "patientId",
    "physicalExamId",
    "dateOfAssessment",
    "diseaseResponseOrStatus",
    "otherResponseClassification",
    "minimalResidualDiseaseAssessment",
    "methodOfResponseEvaluation",
    "responseCriteriaUsed",
    "summaryStage",
    "sitesOfAnyProgressionOrRecurrence",
    "vitalStatus",
    "height",
    "weight",
    "heightUnits",
    "weightUnits",
    "performanceStatus",
    "overallSurvivalInMonths",
    "diseaseFreeSurvivalInMonths",
];

const COMPLICATION_FIELDS: &[&str] = &[
    "patientId",
    "date",
    "lateComplicationOfTherapyDeveloped",
    "lateToxicityDetail",
    "suspectedTreatmentInducedNeoplasmDeveloped",
    "treatmentInducedNeoplasmDetails",
];

const TUMOURBOARD_FIELDS: &[&str] = &[
    "patientId",
    "dateOfMolecularTumorBoard",
    "typeOfSampleAnalyzed",
    "typeOfTumourSampleAnalyzed",
    "analysesDiscussed",
    "somaticSampleType",
    "normalExpressionComparator",
    "diseaseExpressionComparator",
    "hasAGermlineVariantBeenIdentifiedByProfilingThatMayPredisposeToCancer",
    "actionableTargetFound",
    "molecularTumorBoardRecommendation",
    "germlineDnaSampleId",
    "tumorDnaSampleId",
    "tumorRnaSampleId",
    "germlineSnvDiscussed",
    "somaticSnvDiscussed",
    "cnvsDiscussed",
    "structuralVariantDiscussed",
    "classificationOfVariants",
    "clinicalValidationProgress",
    "typeOfValidation",
    "agentOrDrugClass",
    "levelOfEvidenceForExpressionTargetAgentMatch",
    "didTreatmentPlanChangeBasedOnProfilingResult",
    "howTreatmentHasAlteredBasedOnProfiling",
    "reasonTreatmentPlanDidNotChangeBasedOnProfiling",
    "detailsOfTreatmentPlanImpact",
    "patientOrFamilyInformedOfGermlineVariant",
    "patientHasBeenReferredToAHereditaryCancerProgramBasedOnThisMolecularProfiling",
    "summaryReport",
];

const CHEMOTHERAPY_FIELDS: &[&str] = &[
    "patientId",
    "courseNumber",
    "startDate",
    "stopDate",
    "systematicTherapyAgentName",
    "route",
    "dose",
    "doseFrequency",
    "doseUnit",
    "daysPerCycle",
    "numberOfCycle",
    "treatmentIntent",
    "treatingCentreName",
    "type",
    "protocolCode",
    "recordingDate",
    "treatmentPlanId",
];

const RADIOTHERAPY_FIELDS: &[&str] = &[
    "patientId",
    "courseNumber",
    "startDate",
    "stopDate",
    "therapeuticModality",
    "baseline",
    "testResult",
    "testResultStd",
    "treatingCentreName",
    "startIntervalRad",
    "startIntervalRadRaw",
    "recordingDate",
    "adjacentFields",
    "adjacentFractions",
    "complete",
    "brachytherapyDose",
    "siteNumber",
    "technique",
    "treatedRegion",
    "treatmentPlanId",
    "radiationType",
    "radiationSite",
    "totalDose",
    "boostSite",
    "boostDose",
];

const SURGERY_FIELDS: &[&str] = &[
    "patientId",
    "startDate",
    "stopDate",
    "sampleId",
    "collectionTimePoint",
    "diagnosisDate",
    "site",
    "type",
    "recordingDate",
    "treatmentPlanId",
    "courseNumber",
];

const IMMUNOTHERAPY_FIELDS: &[&str] = &[
    "patientId",
    "startDate",
    "immunotherapyType",
    "immunotherapyTarget",
    "immunotherapyDetail",
    "treatmentPlanId",
    "courseNumber",
];

const CELLTRANSPLANT_FIELDS: &[&str] = &[
    "patientId",
    "startDate",
    "cellSource",
    "donorType",
    "treatmentPlanId",
    "courseNumber",
];

const SLIDE_FIELDS: &[&str] = &[
    "patientId",
    "sampleId",
    "slideId",
    "slideOtherId",
    "lymphocyteInfiltrationPercent",
    "tumorNucleiPercent",
    "monocyteInfiltrationPercent",
    "normalCellsPercent",
    "tumorCellsPercent",
    "stromalCellsPercent",
    "eosinophilInfiltrationPercent",
    "neutrophilInfiltrationPercent",
    "granulocyteInfiltrationPercent",
    "necrosisPercent",
    "inflammatoryInfiltrationPercent",
    "proliferatingCellsNumber",
    "sectionLocation",
];

const STUDY_FIELDS: &[&str] = &["patientId", "startDate", "endDate", "status", "recordingDate"];

const LABTEST_FIELDS: &[&str] = &[
    "patientId",
    "startDate",
    "endDate",
    "collectionDate",
    "eventType",
    "testResults",
    "timePoint",
    "recordingDate",
];

const EXTRACTION_FIELDS: &[&str] = &[
    "extractionId",
    "sampleId",
    "rnaBlood",
    "dnaBlood",
    "rnaTissue",
    "dnaTissue",
    "site",
];

const SEQUENCING_FIELDS: &[&str] = &[
    "sequencingId",
    "sampleId",
    "dnaLibraryKit",
    "dnaSeqPlatform",
    "dnaReadLength",
    "rnaLibraryKit",
    "rnaSeqPlatform",
    "rnaReadLength",
    "pcrCycles",
    "extractionId",
    "site",
];

const ALIGNMENT_FIELDS: &[&str] = &[
    "alignmentId",
    "sampleId",
    "inHousePipeline",
    "alignmentTool",
    "mergeTool",
    "markDuplicates",
    "realignerTarget",
    "indelRealigner",
    "baseRecalibrator",
    "printReads",
    "idxStats",
    "flagStat",
    "coverage",
    "insertSizeMetrics",
    "fastqc",
    "reference",
    "sequencingId",
    "site",
];

const VARIANT_CALLING_FIELDS: &[&str] = &[
    "variantCallingId",
    "sampleId",
    "inHousePipeline",
    "variantCaller",
    "tabulate",
    "annotation",
    "mergeTool",
    "rdaToTab",
    "delly",
    "postFilter",
    "clipFilter",
    "cosmic",
    "dbSnp",
    "alignmentId",
    "site",
];

const FUSION_DETECTION_FIELDS: &[&str] = &[
    "fusionDetectionId",
    "sampleId",
    "inHousePipeline",
    "svDetection",
    "fusionDetection",
    "realignment",
    "annotation",
    "genomeReference",
    "geneModels",
    "alignmentId",
    "site",
];

const EXPRESSION_ANALYSIS_FIELDS: &[&str] = &[
    "expressionAnalysisId",
    "sampleId",
    "readLength",
    "reference",
    "alignmentTool",
    "bamHandling",
    "expressionEstimation",
    "sequencingId",
    "site",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_round_trip() {
        for kind in ClinicalKind::ALL {
            assert_eq!(ClinicalKind::from_table(kind.table()), Some(kind));
        }
        assert_eq!(ClinicalKind::from_table("nope"), None);
    }

    #[test]
    fn test_serde_names_match_table_names() {
        for kind in ClinicalKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.table()));
        }
    }

    #[test]
    fn test_provenance_kinds_are_not_joinable() {
        assert!(ClinicalKind::Patients.joinable());
        assert!(ClinicalKind::Diagnoses.joinable());
        assert!(!ClinicalKind::Extractions.joinable());
        assert!(!ClinicalKind::ExpressionAnalysis.joinable());
    }

    #[test]
    fn test_field_lists_have_no_duplicates() {
        for kind in ClinicalKind::ALL {
            let mut fields = kind.fields().to_vec();
            fields.sort_unstable();
            fields.dedup();
            assert_eq!(fields.len(), kind.fields().len(), "duplicate field in {kind}");
        }
    }

    #[test]
    fn test_result_table_parse() {
        assert_eq!(ResultTable::parse("variants"), Some(ResultTable::Variants));
        assert_eq!(ResultTable::parse("variantsByGene"), Some(ResultTable::VariantsByGene));
        assert_eq!(
            ResultTable::parse("treatments"),
            Some(ResultTable::Clinical(ClinicalKind::Treatments))
        );
        assert_eq!(ResultTable::parse("sequencing"), None);
        assert_eq!(ResultTable::parse("readgroupsets"), None);
        assert_eq!(ResultTable::VariantsByGene.response_key(), "variants");
    }

    #[test]
    fn test_genomic_paths() {
        assert_eq!(GenomicKind::from_path("variantsets"), Some(GenomicKind::VariantSets));
        assert_eq!(GenomicKind::VariantSets.table(), "variantSets");
        assert_eq!(GenomicKind::from_path("patients"), None);
    }
}
